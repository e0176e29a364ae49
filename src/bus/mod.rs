use crate::domain::events::PaymentProcessed;

pub mod recording;
pub mod redis_stream;

/// Stream entry field carrying the JSON payload, both inbound and outbound.
pub const EVENT_FIELD: &str = "event";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// Delivers outbound facts to the bus. At-least-once; no deduplication here.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PaymentProcessed) -> Result<(), PublishError>;
}
