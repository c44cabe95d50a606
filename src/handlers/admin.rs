//! Admin surface. Every route sits behind [`admin_auth`].

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::licensing;
use crate::middleware::admin_auth;
use crate::models::{CreateLicense, LicenseWithStatus, Payment, RevokeLicense, StatusFilter};
use crate::pagination::{Paginated, PaginationQuery};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/licenses", post(create_license).get(list_licenses))
        .route("/admin/create-license", post(create_license))
        .route("/admin/licenses/{key}", get(get_license))
        .route("/admin/licenses/{key}/revoke", post(revoke_license))
        .route("/admin/licenses/{key}/reset-device", post(reset_device))
        .route("/admin/licenses/{key}/deactivate", post(deactivate_license))
        .route("/admin/licenses/{key}/activate", post(activate_license))
        .route("/admin/licenses/{key}/payments", get(list_license_payments))
        .route_layer(middleware::from_fn_with_state(state, admin_auth))
}

pub async fn create_license(
    State(state): State<AppState>,
    Json(input): Json<CreateLicense>,
) -> Result<(StatusCode, Json<LicenseWithStatus>)> {
    let now = queries::now();
    let conn = state.db.get()?;
    let license = licensing::create_license(&conn, state.config.default_billing_days, &input, now)?;
    Ok((StatusCode::CREATED, Json(LicenseWithStatus::at(license, now))))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListLicensesQuery {
    pub status: Option<StatusFilter>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_licenses(
    State(state): State<AppState>,
    Query(query): Query<ListLicensesQuery>,
) -> Result<Json<Paginated<LicenseWithStatus>>> {
    let pagination = PaginationQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let conn = state.db.get()?;
    let page = licensing::list(
        &conn,
        query.status,
        query.search.as_deref(),
        &pagination,
        queries::now(),
    )?;
    Ok(Json(page))
}

pub async fn get_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseWithStatus>> {
    let conn = state.db.get()?;
    let license = queries::get_license_by_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(LicenseWithStatus::at(license, queries::now())))
}

/// The body is optional; `reason` may also come from the query string.
pub async fn revoke_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<RevokeLicense>,
    body: Bytes,
) -> Result<Json<LicenseWithStatus>> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<RevokeLicense>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?
            .reason
    };
    let reason = from_body.or(query.reason);
    let now = queries::now();
    let conn = state.db.get()?;
    let license = licensing::revoke(&conn, &key, reason.as_deref(), now)?;
    Ok(Json(LicenseWithStatus::at(license, now)))
}

pub async fn reset_device(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseWithStatus>> {
    let conn = state.db.get()?;
    let license = licensing::reset_device(&conn, &key)?;
    Ok(Json(LicenseWithStatus::at(license, queries::now())))
}

pub async fn deactivate_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseWithStatus>> {
    let conn = state.db.get()?;
    let license = licensing::set_active(&conn, &key, false)?;
    Ok(Json(LicenseWithStatus::at(license, queries::now())))
}

pub async fn activate_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseWithStatus>> {
    let conn = state.db.get()?;
    let license = licensing::set_active(&conn, &key, true)?;
    Ok(Json(LicenseWithStatus::at(license, queries::now())))
}

pub async fn list_license_payments(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Vec<Payment>>> {
    let conn = state.db.get()?;
    if queries::get_license_by_key(&conn, &key)?.is_none() {
        return Err(AppError::NotFound("License not found".into()));
    }
    Ok(Json(queries::list_payments_for_license(&conn, &key)?))
}
