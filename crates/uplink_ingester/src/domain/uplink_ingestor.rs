use crate::domain::{decode_payload, extract_record, IngestClock, UplinkHandler};
use crate::mqtt::parse_uplink_topic;
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, InboundMessage, UplinkRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info_span, warn, Instrument, Span};

/// Turns one inbound message into at most one stored uplink record
///
/// Flow:
/// 1. Decode the payload as a JSON object
/// 2. Extract the uplink fields, absent where the payload lacks them
/// 3. Stamp the ingestion time
/// 4. Insert through the repository, bounded by `insert_timeout`
///
/// Every failure is logged and the message dropped. Nothing is retried.
pub struct UplinkIngestor {
    repository: Arc<dyn UplinkRepository>,
    insert_timeout: Duration,
    clock: IngestClock,
}

impl UplinkIngestor {
    pub fn new(repository: Arc<dyn UplinkRepository>, insert_timeout: Duration) -> Self {
        Self {
            repository,
            insert_timeout,
            clock: IngestClock::new(),
        }
    }

    /// Handle a single message; never fails
    ///
    /// Creates a new independent trace for each message.
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        let span = info_span!(
            parent: Span::none(),
            "mqtt_message",
            topic = %topic,
            payload_size = payload.len(),
            application_id = tracing::field::Empty,
            dev_eui = tracing::field::Empty,
        );

        async {
            if let Ok(parsed) = parse_uplink_topic(topic) {
                Span::current().record("application_id", parsed.application_id.as_str());
                Span::current().record("dev_eui", parsed.dev_eui.as_str());
            }

            match self.ingest(payload).await {
                Ok(()) => debug!("stored uplink"),
                Err(e @ DomainError::DecodeError(_)) => {
                    warn!(topic = %topic, error = %e, "failed to decode uplink, dropping message");
                }
                Err(e) => {
                    error!(topic = %topic, error = %e, "failed to store uplink, dropping message");
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Decode, extract, stamp and insert; the error says which step failed
    pub async fn ingest(&self, payload: &[u8]) -> DomainResult<()> {
        let decoded = decode_payload(payload)?;
        let record = extract_record(&decoded, self.clock.now());

        match tokio::time::timeout(self.insert_timeout, self.repository.insert(&record)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::StoreError(anyhow::anyhow!(
                "insert timed out after {:?}",
                self.insert_timeout
            ))),
        }
    }
}

#[async_trait]
impl UplinkHandler for UplinkIngestor {
    async fn on_message(&self, message: InboundMessage) {
        self.handle(&message.topic, &message.payload).await;
    }
}
