use crate::clickhouse::ClickHouseClient;
use crate::domain::{DomainError, DomainResult, UplinkRecord, UplinkRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Database row for a single uplink
///
/// Pass-through fields are stored as JSON text, strings included, so the
/// original JSON type survives the round trip. ClickHouse does not allow
/// `Nullable(JSON)`, and absent fields must stay `NULL`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct UplinkRow {
    pub application_id: Option<String>,
    pub dev_eui: Option<String>,
    pub f_port: Option<i64>,
    pub data: Option<String>,
    pub rx_info: Option<String>,
    pub object_json: Option<String>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
}

impl From<&UplinkRecord> for UplinkRow {
    fn from(record: &UplinkRecord) -> Self {
        UplinkRow {
            application_id: record.application_id.clone(),
            dev_eui: record.dev_eui.clone(),
            f_port: record.f_port,
            data: record.data.as_ref().map(|value| value.to_string()),
            rx_info: record.rx_info.as_ref().map(|value| value.to_string()),
            object_json: record.object_json.as_ref().map(|value| value.to_string()),
            timestamp: record.timestamp,
        }
    }
}

/// ClickHouse implementation of UplinkRepository
#[derive(Clone)]
pub struct ClickHouseUplinkRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseUplinkRepository {
    pub fn new(client: ClickHouseClient, table: String) -> Self {
        Self { client, table }
    }

    /// Create the uplink table if it does not exist yet
    pub async fn ensure_table(&self) -> DomainResult<()> {
        info!(table = %self.table, "ensuring uplink table exists");

        self.client
            .execute(&create_table_sql(&self.table))
            .await
            .map_err(|e| DomainError::ConnectionError(format!("Failed to create table: {:#}", e)))
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            application_id Nullable(String), \
            dev_eui Nullable(String), \
            f_port Nullable(Int64), \
            data Nullable(String), \
            rx_info Nullable(String), \
            object_json Nullable(String), \
            timestamp DateTime64(3, 'UTC')\
        ) ENGINE = MergeTree ORDER BY timestamp",
        table
    )
}

#[async_trait]
impl UplinkRepository for ClickHouseUplinkRepository {
    async fn insert(&self, record: &UplinkRecord) -> DomainResult<()> {
        let row = UplinkRow::from(record);

        let mut insert = self
            .client
            .get_client()
            .insert::<UplinkRow>(&self.table)
            .await
            .map_err(|e| {
                error!("Failed to create ClickHouse insert: {}", e);
                DomainError::StoreError(e.into())
            })?;

        insert.write(&row).await.map_err(|e| {
            error!("Failed to write row to ClickHouse: {}", e);
            DomainError::StoreError(e.into())
        })?;

        insert.end().await.map_err(|e| {
            error!("Failed to finalize ClickHouse insert: {}", e);
            DomainError::StoreError(e.into())
        })?;

        debug!(
            table = %self.table,
            dev_eui = row.dev_eui.as_deref().unwrap_or("-"),
            "stored uplink"
        );

        Ok(())
    }
}
