use crate::bus::{EventPublisher, PublishError};
use crate::decision::DecisionEngine;
use crate::domain::events::{InvalidFact, OrderPlaced};
use crate::domain::payment::Payment;
use crate::repo::{PaymentStore, PublicationClaim, StoreError};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// What happened to one inbound fact. Every variant is acknowledged by the
/// transport; `Rejected` is dead-lettered first.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Decided, persisted and published for the first time.
    Processed(Payment),
    /// A prior delivery already persisted and published this order.
    AlreadyProcessed,
    /// A prior delivery persisted the payment but never published it.
    Republished(Payment),
    Rejected(InvalidFact),
}

/// Failures that must leave the inbound message unacknowledged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Storage(StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("payment for order {0} is being published by another handler")]
    PublicationInFlight(Uuid),
    #[error("duplicate reported for order {0} but no payment is visible")]
    PaymentMissing(Uuid),
}

impl From<StoreError> for ConsumeError {
    fn from(e: StoreError) -> Self {
        ConsumeError::Storage(e)
    }
}

#[derive(Clone)]
pub struct OrderPlacedConsumer {
    pub store: Arc<dyn PaymentStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub decision: Arc<dyn DecisionEngine>,
}

impl OrderPlacedConsumer {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        publisher: Arc<dyn EventPublisher>,
        decision: Arc<dyn DecisionEngine>,
    ) -> Self {
        Self {
            store,
            publisher,
            decision,
        }
    }

    /// Parses a raw stream payload and handles it. Unparseable payloads are rejected.
    pub async fn handle_payload(&self, raw: &str) -> Result<HandleOutcome, ConsumeError> {
        match OrderPlaced::from_json(raw) {
            Ok(fact) => self.handle(&fact).await,
            Err(invalid) => Ok(HandleOutcome::Rejected(invalid)),
        }
    }

    pub async fn handle(&self, fact: &OrderPlaced) -> Result<HandleOutcome, ConsumeError> {
        let amount = match fact.validated_amount() {
            Ok(amount) => amount,
            Err(invalid) => {
                tracing::warn!(order_id = %fact.order_id, "rejecting order placed fact: {}", invalid);
                return Ok(HandleOutcome::Rejected(invalid));
            }
        };

        let status = self.decision.decide(amount).await;
        let payment = Payment::new(fact.order_id, amount, status, Utc::now());

        match self.store.add(&payment).await {
            Ok(()) => {}
            Err(StoreError::DuplicateOrder(_)) => return self.resume_duplicate(fact).await,
            Err(e) => return Err(e.into()),
        }

        self.publisher.publish(&fact.processed(amount, status)).await?;
        self.mark_published(fact.order_id).await;

        tracing::info!(
            order_id = %fact.order_id,
            payment_id = %payment.id,
            status = %status,
            engine = self.decision.name(),
            "payment processed"
        );
        Ok(HandleOutcome::Processed(payment))
    }

    async fn resume_duplicate(&self, fact: &OrderPlaced) -> Result<HandleOutcome, ConsumeError> {
        match self.store.claim_publication(fact.order_id).await? {
            PublicationClaim::AlreadyPublished => {
                tracing::info!(order_id = %fact.order_id, "duplicate delivery, already processed");
                Ok(HandleOutcome::AlreadyProcessed)
            }
            PublicationClaim::Claimed(stored) => {
                // Stored decision wins over anything decided on this delivery.
                self.publisher
                    .publish(&fact.processed(stored.amount, stored.status))
                    .await?;
                self.mark_published(fact.order_id).await;
                tracing::info!(
                    order_id = %fact.order_id,
                    payment_id = %stored.id,
                    status = %stored.status,
                    "republished unpublished payment"
                );
                Ok(HandleOutcome::Republished(stored))
            }
            PublicationClaim::InFlight => Err(ConsumeError::PublicationInFlight(fact.order_id)),
            PublicationClaim::Missing => Err(ConsumeError::PaymentMissing(fact.order_id)),
        }
    }

    // Called after a successful publish; a failure here never blocks the ack.
    async fn mark_published(&self, order_id: Uuid) {
        if let Err(e) = self.store.mark_published(order_id).await {
            tracing::warn!(order_id = %order_id, "failed to mark payment published: {}", e);
        }
    }
}
