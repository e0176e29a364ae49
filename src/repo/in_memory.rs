use crate::domain::payment::Payment;
use crate::repo::{PaymentStore, PublicationClaim, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Entry {
    payment: Payment,
    published_at: Option<DateTime<Utc>>,
    lease_until: Option<DateTime<Utc>>,
}

/// Process-local [`PaymentStore`] keyed by order id.
///
/// The uniqueness check and the insert happen under one write lock, which gives
/// the same arbitration a unique index gives in Postgres.
#[derive(Clone)]
pub struct InMemoryPaymentsRepo {
    entries: Arc<RwLock<HashMap<Uuid, Entry>>>,
    publish_lease: Duration,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryPaymentsRepo {
    fn default() -> Self {
        Self::new(Duration::seconds(30))
    }
}

impl InMemoryPaymentsRepo {
    pub fn new(publish_lease: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            publish_lease,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn is_published(&self, order_id: Uuid) -> bool {
        self.entries
            .read()
            .await
            .get(&order_id)
            .is_some_and(|e| e.published_at.is_some())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked down".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentStore for InMemoryPaymentsRepo {
    async fn add(&self, payment: &Payment) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        if entries.contains_key(&payment.order_id) {
            return Err(StoreError::DuplicateOrder(payment.order_id));
        }
        entries.insert(
            payment.order_id,
            Entry {
                payment: payment.clone(),
                published_at: None,
                lease_until: Some(Utc::now() + self.publish_lease),
            },
        );
        Ok(())
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries.get(&order_id).map(|e| e.payment.clone()))
    }

    async fn claim_publication(&self, order_id: Uuid) -> Result<PublicationClaim, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&order_id) else {
            return Ok(PublicationClaim::Missing);
        };

        if entry.published_at.is_some() {
            return Ok(PublicationClaim::AlreadyPublished);
        }
        if entry.lease_until.is_some_and(|until| until >= now) {
            return Ok(PublicationClaim::InFlight);
        }

        entry.lease_until = Some(now + self.publish_lease);
        Ok(PublicationClaim::Claimed(entry.payment.clone()))
    }

    async fn mark_published(&self, order_id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&order_id) {
            if entry.published_at.is_none() {
                entry.published_at = Some(Utc::now());
                entry.lease_until = None;
            }
        }
        Ok(())
    }
}
