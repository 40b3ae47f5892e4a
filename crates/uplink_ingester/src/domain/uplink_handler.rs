use async_trait::async_trait;
use common::domain::InboundMessage;

/// Receives every message the subscriber delivers
///
/// There is no return value: implementations own their failures and must
/// log them instead of handing them back to the delivery loop.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UplinkHandler: Send + Sync {
    async fn on_message(&self, message: InboundMessage);
}
