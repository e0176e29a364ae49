use crate::domain::payment::Payment;
use crate::repo::{PaymentStore, StoreError};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("no payment for order {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Read path for synchronous callers. No caching.
#[derive(Clone)]
pub struct PaymentLookup {
    pub store: Arc<dyn PaymentStore>,
}

impl PaymentLookup {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_order(&self, order_id: Uuid) -> Result<Payment, LookupError> {
        self.store
            .get_by_order(order_id)
            .await?
            .ok_or(LookupError::NotFound(order_id))
    }
}
