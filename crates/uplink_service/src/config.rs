use common::clickhouse::ClickHouseConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uplink_ingester::UplinkIngesterConfig;
use uplink_ingester::mqtt::{MqttConnectOptions, UPLINK_TOPIC_FILTER, parse_qos};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    #[serde(default)]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // MQTT configuration
    /// Broker host name
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Subscription filter, MQTT `+`/`#` wildcards allowed
    ///
    /// Shared subscriptions (`$share/<group>/...`) are not supported: inbound
    /// topics are checked against this filter and would never match it.
    #[serde(default = "default_mqtt_topic_filter")]
    pub mqtt_topic_filter: String,

    #[serde(default)]
    pub mqtt_username: Option<String>,

    #[serde(default)]
    pub mqtt_password: Option<String>,

    /// Subscription QoS level: 0, 1 or 2
    #[serde(default)]
    pub mqtt_qos: u8,

    /// Wait between a dropped connection and the next dial
    #[serde(default = "default_mqtt_reconnect_delay_secs")]
    pub mqtt_reconnect_delay_secs: u64,

    // ClickHouse configuration
    #[serde(default = "default_clickhouse_host")]
    pub clickhouse_host: String,

    /// ClickHouse HTTP port
    #[serde(default = "default_clickhouse_port")]
    pub clickhouse_port: u16,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    /// Table uplinks are written to
    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default)]
    pub clickhouse_password: String,

    /// Create the uplink table at startup when it does not exist
    #[serde(default = "default_clickhouse_create_table")]
    pub clickhouse_create_table: bool,

    /// Upper bound on a single uplink insert in seconds
    #[serde(default = "default_insert_timeout_secs")]
    pub insert_timeout_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "uplink-ingester".to_string()
}

fn default_mqtt_host() -> String {
    "mosquitto".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_keep_alive_secs() -> u64 {
    60
}

fn default_mqtt_client_id() -> String {
    "uplink-ingester".to_string()
}

fn default_mqtt_topic_filter() -> String {
    UPLINK_TOPIC_FILTER.to_string()
}

fn default_mqtt_reconnect_delay_secs() -> u64 {
    5
}

fn default_clickhouse_host() -> String {
    "localhost".to_string()
}

fn default_clickhouse_port() -> u16 {
    8123
}

fn default_clickhouse_database() -> String {
    "default".to_string()
}

fn default_clickhouse_table() -> String {
    "uplinks".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_create_table() -> bool {
    true
}

fn default_insert_timeout_secs() -> u64 {
    10
}

fn default_startup_timeout_secs() -> u64 {
    30
}

impl ServiceConfig {
    /// Load configuration from `UPLINK_`-prefixed environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("UPLINK"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn clickhouse_config(&self) -> ClickHouseConfig {
        ClickHouseConfig {
            host: self.clickhouse_host.clone(),
            port: self.clickhouse_port,
            database: self.clickhouse_database.clone(),
            table: self.clickhouse_table.clone(),
            username: self.clickhouse_username.clone(),
            password: self.clickhouse_password.clone(),
        }
    }

    pub fn ingester_config(&self) -> anyhow::Result<UplinkIngesterConfig> {
        let mqtt = MqttConnectOptions {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            client_id: self.mqtt_client_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
        };
        mqtt.validate()?;

        if self.mqtt_topic_filter.trim().is_empty() {
            anyhow::bail!("MQTT topic filter cannot be empty");
        }

        if self.mqtt_topic_filter.starts_with("$share/") {
            anyhow::bail!(
                "Shared subscription filter '{}' is not supported",
                self.mqtt_topic_filter
            );
        }

        Ok(UplinkIngesterConfig {
            mqtt,
            topic_filter: self.mqtt_topic_filter.clone(),
            qos: parse_qos(self.mqtt_qos)?,
            reconnect_delay: Duration::from_secs(self.mqtt_reconnect_delay_secs),
            insert_timeout: Duration::from_secs(self.insert_timeout_secs),
            connect_timeout: self.startup_timeout(),
        })
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}
