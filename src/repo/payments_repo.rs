use crate::domain::payment::{Payment, PaymentStatus};
use crate::repo::{PaymentStore, PublicationClaim, StoreError};
use chrono::Duration;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
    pub publish_lease: Duration,
}

impl PaymentsRepo {
    pub fn new(pool: PgPool, publish_lease: Duration) -> Self {
        Self { pool, publish_lease }
    }
}

// Lease deadlines are computed and compared on the database clock only.
const INSERT_PAYMENT_SQL: &str = r#"
    INSERT INTO payments (id, order_id, amount, status, created_at, published_at, publish_lease_until)
    VALUES ($1, $2, $3, $4, $5, NULL, now() + make_interval(secs => $6))
"#;

const CLAIM_PUBLICATION_SQL: &str = r#"
    UPDATE payments
    SET publish_lease_until = now() + make_interval(secs => $2)
    WHERE order_id = $1
      AND published_at IS NULL
      AND (publish_lease_until IS NULL OR publish_lease_until < now())
    RETURNING id, order_id, amount, status, created_at
"#;

fn lease_seconds(lease: Duration) -> f64 {
    lease.num_milliseconds() as f64 / 1000.0
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let code: i16 = row.try_get("status").map_err(unavailable)?;
    let status = PaymentStatus::from_code(code)
        .ok_or_else(|| StoreError::Unavailable(format!("unknown payment status code {}", code)))?;

    Ok(Payment {
        id: row.try_get("id").map_err(unavailable)?,
        order_id: row.try_get("order_id").map_err(unavailable)?,
        amount: row.try_get("amount").map_err(unavailable)?,
        status,
        created_at: row.try_get("created_at").map_err(unavailable)?,
    })
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn add(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(INSERT_PAYMENT_SQL)
            .bind(payment.id)
            .bind(payment.order_id)
            .bind(payment.amount)
            .bind(payment.status.code())
            .bind(payment.created_at)
            .bind(lease_seconds(self.publish_lease))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return StoreError::DuplicateOrder(payment.order_id);
                    }
                }
                unavailable(e)
            })?;

        Ok(())
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount, status, created_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn claim_publication(&self, order_id: Uuid) -> Result<PublicationClaim, StoreError> {
        let claimed = sqlx::query(CLAIM_PUBLICATION_SQL)
            .bind(order_id)
            .bind(lease_seconds(self.publish_lease))
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        if let Some(row) = claimed {
            return Ok(PublicationClaim::Claimed(payment_from_row(&row)?));
        }

        let state = sqlx::query("SELECT published_at IS NOT NULL AS published FROM payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        let Some(row) = state else {
            return Ok(PublicationClaim::Missing);
        };
        let published: bool = row.try_get("published").map_err(unavailable)?;
        Ok(if published {
            PublicationClaim::AlreadyPublished
        } else {
            PublicationClaim::InFlight
        })
    }

    async fn mark_published(&self, order_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE payments SET published_at = now(), publish_lease_until = NULL WHERE order_id = $1 AND published_at IS NULL",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}
