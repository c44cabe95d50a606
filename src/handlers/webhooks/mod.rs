mod mercadopago;

pub use mercadopago::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mp/webhook", post(handle_mercadopago_webhook))
        .route("/webhook/mercadopago", post(handle_mercadopago_webhook))
}
