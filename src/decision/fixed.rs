use crate::decision::DecisionEngine;
use crate::domain::payment::PaymentStatus;
use rust_decimal::Decimal;

pub struct FixedDecision {
    pub status: PaymentStatus,
}

#[async_trait::async_trait]
impl DecisionEngine for FixedDecision {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn decide(&self, _amount: Decimal) -> PaymentStatus {
        self.status
    }
}
