use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::db::AppState;
use crate::licensing::verify_admin_key;
use crate::util::extract_admin_key;

/// Reject requests that don't carry the configured admin secret.
pub async fn admin_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = extract_admin_key(request.headers(), request.uri());

    if let Err(e) = verify_admin_key(&state.config.admin_api_key, provided.as_deref()) {
        tracing::warn!(
            "Rejected admin request to {} (credential {})",
            request.uri().path(),
            if provided.is_some() { "invalid" } else { "missing" }
        );
        return e.into_response();
    }

    next.run(request).await
}
