use crate::bus::{EventPublisher, PublishError};
use crate::domain::events::PaymentProcessed;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Keeps published events in memory. Can be told to fail the next N publishes.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<PaymentProcessed>>>,
    failures_left: Arc<AtomicUsize>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PaymentProcessed> {
        self.published
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &PaymentProcessed) -> Result<(), PublishError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError::Transport("simulated transport failure".to_string()));
        }

        self.published
            .lock()
            .map_err(|_| PublishError::Transport("recording publisher poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}
