mod payments;
mod validate;

pub use payments::*;
pub use validate::*;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::extractors::Json;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/license/validate",
            get(validate_license_query).post(validate_license),
        )
        .route("/payments", post(create_payment))
        .route("/payments/{payment_id}", get(get_payment))
}
