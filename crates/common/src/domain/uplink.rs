use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A message as delivered by the bus, before any decoding
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Normalized uplink event as persisted to the store
///
/// Every field other than `timestamp` is `None` when the source payload did
/// not carry it. `timestamp` is the ingestion instant, not the device or
/// network-server time.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkRecord {
    pub application_id: Option<String>,
    pub dev_eui: Option<String>,
    pub f_port: Option<i64>,
    pub data: Option<serde_json::Value>,
    pub rx_info: Option<serde_json::Value>,
    pub object_json: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Store writer for uplink records
///
/// Infrastructure layer (e.g., ClickHouse) implements this trait. One call
/// writes exactly one record; there is no batching and no retry.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UplinkRepository: Send + Sync {
    /// Persist a single uplink record
    ///
    /// # Returns
    /// () on success, `DomainError::StoreError` on failure
    async fn insert(&self, record: &UplinkRecord) -> DomainResult<()>;
}
