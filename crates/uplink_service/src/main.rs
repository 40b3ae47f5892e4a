mod config;

use anyhow::Context;
use common::clickhouse::{ClickHouseClient, ClickHouseUplinkRepository};
use common::domain::UplinkRepository;
use common::telemetry::{TelemetryProviders, init_telemetry, shutdown_telemetry};
use crate::config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uplink_ingester::UplinkIngester;
use uplink_runner::Runner;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting uplink ingestion service"
    );
    debug!(
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        mqtt_topic_filter = %config.mqtt_topic_filter,
        clickhouse_host = %config.clickhouse_host,
        clickhouse_database = %config.clickhouse_database,
        clickhouse_table = %config.clickhouse_table,
        "configuration loaded"
    );

    let ingester_config = match config.ingester_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid MQTT configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let repository = match initialize_repository(&config).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("Failed to initialize ClickHouse: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Connecting to MQTT broker...");
    let uplink_ingester = match UplinkIngester::new(repository, ingester_config).await {
        Ok(ingester) => ingester,
        Err(e) => {
            error!("Failed to initialize uplink ingester: {:#}", e);
            std::process::exit(1);
        }
    };

    Runner::new()
        .with_named_process("uplink_ingester", uplink_ingester.into_runner_process())
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                // Flush pending traces
                shutdown_telemetry(telemetry_providers);
                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

async fn initialize_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<dyn UplinkRepository>> {
    let clickhouse_config = config.clickhouse_config();
    clickhouse_config.validate_table_name()?;

    info!(url = %clickhouse_config.url(), "Initializing ClickHouse...");
    let client = ClickHouseClient::new(
        &clickhouse_config.url(),
        &clickhouse_config.database,
        &clickhouse_config.username,
        &clickhouse_config.password,
    );

    tokio::time::timeout(config.startup_timeout(), client.ping())
        .await
        .with_context(|| {
            format!(
                "ClickHouse did not answer within {}s",
                config.startup_timeout_secs
            )
        })??;

    let repository = ClickHouseUplinkRepository::new(client, clickhouse_config.table);

    if config.clickhouse_create_table {
        repository.ensure_table().await?;
    }

    Ok(Arc::new(repository))
}
