use crate::domain::payment::PaymentStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound fact published by the orders service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    #[serde(alias = "userId")]
    pub user_id: Uuid,
    #[serde(alias = "gameId")]
    pub game_id: Uuid,
    pub price: Decimal,
}

/// Outbound fact, emitted once per persisted payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub game_id: Uuid,
    pub price: Decimal,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidFact {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("stream entry has no event payload")]
    MissingPayload,
    #[error("price {0} is negative")]
    NegativePrice(Decimal),
    #[error("price {0} has more than two fractional digits")]
    TooPrecise(Decimal),
    #[error("price {0} does not fit the stored amount precision")]
    PriceOutOfRange(Decimal),
    #[error("{0} is the nil uuid")]
    NilIdentifier(&'static str),
}

impl InvalidFact {
    /// Short machine-readable reason stored on dead-lettered entries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            InvalidFact::Malformed(_) => "MALFORMED",
            InvalidFact::MissingPayload => "MISSING_PAYLOAD",
            InvalidFact::NegativePrice(_) => "NEGATIVE_PRICE",
            InvalidFact::TooPrecise(_) => "PRICE_TOO_PRECISE",
            InvalidFact::PriceOutOfRange(_) => "PRICE_OUT_OF_RANGE",
            InvalidFact::NilIdentifier(_) => "NIL_IDENTIFIER",
        }
    }
}

/// Exclusive upper bound of `payments.amount`, a `NUMERIC(18, 2)` column.
pub const MAX_AMOUNT_EXCLUSIVE: i64 = 10_000_000_000_000_000;

impl OrderPlaced {
    pub fn from_json(raw: &str) -> Result<Self, InvalidFact> {
        serde_json::from_str(raw).map_err(|e| InvalidFact::Malformed(e.to_string()))
    }

    /// Checks the fact and returns the price rescaled to two fractional digits.
    pub fn validated_amount(&self) -> Result<Decimal, InvalidFact> {
        if self.order_id.is_nil() {
            return Err(InvalidFact::NilIdentifier("order_id"));
        }
        if self.user_id.is_nil() {
            return Err(InvalidFact::NilIdentifier("user_id"));
        }
        if self.game_id.is_nil() {
            return Err(InvalidFact::NilIdentifier("game_id"));
        }
        if self.price < Decimal::ZERO {
            return Err(InvalidFact::NegativePrice(self.price));
        }
        if self.price.normalize().scale() > 2 {
            return Err(InvalidFact::TooPrecise(self.price));
        }
        if self.price >= Decimal::from(MAX_AMOUNT_EXCLUSIVE) {
            return Err(InvalidFact::PriceOutOfRange(self.price));
        }

        let mut amount = self.price;
        amount.rescale(2);
        Ok(amount)
    }

    pub fn processed(&self, amount: Decimal, status: PaymentStatus) -> PaymentProcessed {
        PaymentProcessed {
            order_id: self.order_id,
            user_id: self.user_id,
            game_id: self.game_id,
            price: amount,
            status: status.to_string(),
        }
    }
}
