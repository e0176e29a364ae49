use crate::http::handlers::ops::OpsState;
use crate::service::lookup_service::PaymentLookup;
use axum::routing::get;
use axum::Router;

pub mod handlers {
    pub mod ops;
    pub mod payments;
}

/// Public read API. Writes only ever arrive through the order stream.
pub fn payments_router(lookup: PaymentLookup) -> Router {
    Router::new()
        .route("/health", get(handlers::payments::health))
        .route(
            "/api/payments/by-order/:order_id",
            get(handlers::payments::get_by_order),
        )
        .with_state(lookup)
}

pub fn ops_router(state: OpsState) -> Router {
    Router::new()
        .route("/ops/readiness", get(handlers::ops::readiness))
        .route("/ops/liveness", get(handlers::ops::liveness))
        .with_state(state)
}
