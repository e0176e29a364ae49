use crate::domain::payment::Payment;
use uuid::Uuid;

pub mod in_memory;
pub mod payments_repo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("a payment for order {0} already exists")]
    DuplicateOrder(Uuid),
    #[error("payment storage unavailable: {0}")]
    Unavailable(String),
}

/// Result of trying to take over publication of an already stored payment.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicationClaim {
    /// The caller now holds the publish lease and must publish then mark.
    Claimed(Payment),
    AlreadyPublished,
    /// Unpublished, but another handler holds a live lease.
    InFlight,
    Missing,
}

/// Durable storage for payment decisions, one per order.
///
/// `add` must enforce order uniqueness atomically in the backing store; callers
/// never pre-check with `get_by_order`. A successful `add` leaves the caller
/// holding the publish lease for that order.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn add(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn claim_publication(&self, order_id: Uuid) -> Result<PublicationClaim, StoreError>;

    async fn mark_published(&self, order_id: Uuid) -> Result<(), StoreError>;
}
