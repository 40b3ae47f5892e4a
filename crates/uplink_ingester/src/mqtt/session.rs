use async_trait::async_trait;
use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, QoS};
use std::time::Duration;
use tracing::debug;

const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttConnectOptions {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConnectOptions {
    fn default() -> Self {
        Self {
            host: "mosquitto".to_string(),
            port: 1883,
            keep_alive: Duration::from_secs(60),
            client_id: "uplink-ingester".to_string(),
            username: None,
            password: None,
        }
    }
}

impl MqttConnectOptions {
    /// Check the values rumqttc would otherwise reject with a panic
    pub fn validate(&self) -> DomainResult<()> {
        if self.host.trim().is_empty() {
            return Err(DomainError::InvalidConfig(
                "MQTT host cannot be empty".to_string(),
            ));
        }

        if self.client_id.is_empty() || self.client_id.starts_with(' ') {
            return Err(DomainError::InvalidConfig(format!(
                "Invalid MQTT client id '{}'",
                self.client_id
            )));
        }

        if self.keep_alive < Duration::from_secs(1) {
            return Err(DomainError::InvalidConfig(format!(
                "MQTT keep-alive must be at least one second, got {:?}",
                self.keep_alive
            )));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(DomainError::InvalidConfig(
                "MQTT password set without a username".to_string(),
            ));
        }

        Ok(())
    }

    fn to_mqtt_options(&self) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&self.client_id, &self.host, self.port);
        mqtt_options.set_keep_alive(self.keep_alive);
        // The broker keeps no subscriptions for us; every ConnAck is followed by a subscribe
        mqtt_options.set_clean_session(true);

        if let Some(username) = &self.username {
            mqtt_options.set_credentials(username, self.password.as_deref().unwrap_or(""));
        }

        mqtt_options
    }
}

/// One MQTT client connection as seen by the subscriber
///
/// `poll` drives the connection: it returns the next event, an error when the
/// transport drops, and re-dials the broker on the call after an error.
#[async_trait]
pub trait MqttSession: Send {
    async fn poll(&mut self) -> Result<Event, ConnectionError>;

    async fn subscribe(&mut self, topic_filter: &str, qos: QoS) -> DomainResult<()>;

    async fn disconnect(&mut self) -> DomainResult<()>;
}

/// rumqttc-backed session
pub struct RumqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl RumqttSession {
    /// Build the client; no network I/O happens until the first `poll`
    pub fn new(options: &MqttConnectOptions) -> DomainResult<Self> {
        options.validate()?;

        debug!(
            host = %options.host,
            port = options.port,
            client_id = %options.client_id,
            keep_alive_secs = options.keep_alive.as_secs(),
            "creating MQTT client"
        );

        let (client, eventloop) = AsyncClient::new(options.to_mqtt_options(), 100);
        Ok(Self { client, eventloop })
    }
}

#[async_trait]
impl MqttSession for RumqttSession {
    async fn poll(&mut self) -> Result<Event, ConnectionError> {
        self.eventloop.poll().await
    }

    async fn subscribe(&mut self, topic_filter: &str, qos: QoS) -> DomainResult<()> {
        self.client.subscribe(topic_filter, qos).await.map_err(|e| {
            DomainError::ConnectionError(format!("Failed to subscribe to '{}': {}", topic_filter, e))
        })
    }

    async fn disconnect(&mut self) -> DomainResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| DomainError::ConnectionError(format!("Failed to disconnect: {}", e)))?;

        // The DISCONNECT packet only reaches the broker when the event loop is polled
        let eventloop = &mut self.eventloop;
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };

        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await.is_err() {
            debug!("timed out flushing MQTT disconnect");
        }

        Ok(())
    }
}

/// Map a numeric QoS level (0, 1, 2) to rumqttc's QoS
pub fn parse_qos(level: u8) -> DomainResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(DomainError::InvalidConfig(format!(
            "Invalid MQTT QoS level {}: expected 0, 1 or 2",
            other
        ))),
    }
}
