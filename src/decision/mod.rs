use crate::domain::payment::PaymentStatus;
use rust_decimal::Decimal;

pub mod fixed;
pub mod random;

/// Turns an order amount into a payment outcome.
///
/// Implementations must always return one of the [`PaymentStatus`] variants;
/// the consumer has no failure path for this step.
#[async_trait::async_trait]
pub trait DecisionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decide(&self, amount: Decimal) -> PaymentStatus;
}
