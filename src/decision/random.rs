use crate::decision::DecisionEngine;
use crate::domain::payment::PaymentStatus;
use rand::Rng;
use rust_decimal::Decimal;

/// Simulated gateway: approves `approval_percent` out of every 100 draws.
pub struct RandomApproval {
    pub approval_percent: u32,
}

impl Default for RandomApproval {
    fn default() -> Self {
        Self { approval_percent: 80 }
    }
}

impl RandomApproval {
    pub fn status_for_draw(&self, draw: u32) -> PaymentStatus {
        if draw < self.approval_percent {
            PaymentStatus::Approved
        } else {
            PaymentStatus::Rejected
        }
    }
}

#[async_trait::async_trait]
impl DecisionEngine for RandomApproval {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn decide(&self, _amount: Decimal) -> PaymentStatus {
        let draw: u32 = rand::thread_rng().gen_range(0..100);
        self.status_for_draw(draw)
    }
}
