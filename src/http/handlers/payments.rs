use crate::domain::payment::ErrorEnvelope;
use crate::service::lookup_service::{LookupError, PaymentLookup};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

pub async fn get_by_order(
    State(lookup): State<PaymentLookup>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match lookup.get_by_order(order_id).await {
        Ok(payment) => (axum::http::StatusCode::OK, Json(payment)).into_response(),
        Err(LookupError::NotFound(_)) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(ErrorEnvelope::new(
                "PAYMENT_NOT_FOUND",
                "no payment recorded for this order",
                None,
            )),
        )
            .into_response(),
        Err(LookupError::Storage(e)) => {
            tracing::error!(order_id = %order_id, "payment lookup failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorEnvelope::new(
                    "STORAGE_UNAVAILABLE",
                    "payment storage is unavailable",
                    Some(e.to_string()),
                )),
            )
                .into_response()
        }
    }
}

pub async fn health() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "ok")
}
