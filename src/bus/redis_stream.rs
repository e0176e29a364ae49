use crate::bus::{EventPublisher, PublishError, EVENT_FIELD};
use crate::domain::events::PaymentProcessed;

#[derive(Clone)]
pub struct RedisStreamPublisher {
    pub redis_client: redis::Client,
    pub stream_key: String,
    pub max_len: usize,
}

impl RedisStreamPublisher {
    pub fn new(redis_client: redis::Client, stream_key: impl Into<String>) -> Self {
        Self {
            redis_client,
            stream_key: stream_key.into(),
            max_len: 1_000_000,
        }
    }
}

#[async_trait::async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: &PaymentProcessed) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event).map_err(|e| PublishError::Encode(e.to_string()))?;

        let mut conn = self
            .redis_client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        tracing::debug!(order_id = %event.order_id, entry_id = %entry_id, "published payment processed");
        Ok(())
    }
}
