use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::{CreatePayment, Payment};
use crate::payments::{self, PaymentHandle};

pub async fn create_payment(
    State(state): State<AppState>,
    Json(input): Json<CreatePayment>,
) -> Result<Json<PaymentHandle>> {
    let handle = payments::create_payment(&state, &input).await?;
    Ok(Json(handle))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = queries::get_payment(&conn, &payment_id)?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    Ok(Json(payment))
}
