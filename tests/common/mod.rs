//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use serde_json::Value;
use tempfile::TempDir;

pub use prospecta::config::{Config, MercadoPagoConfig};
pub use prospecta::db::{AppState, DbConn, create_pool, queries};
pub use prospecta::licensing;
pub use prospecta::models::{CreateLicense, License, Plan};
pub use prospecta::payments::MercadoPagoClient;

pub const TEST_ADMIN_KEY: &str = "test-admin-key-0123456789";
pub const TEST_MP_TOKEN: &str = "TEST-access-token";
pub const BILLING_DAYS: i64 = 30;
pub const ONE_DAY: i64 = 86400;

/// Nothing listens here, so processor calls fail fast.
const UNREACHABLE_PROCESSOR: &str = "http://127.0.0.1:9";

pub const TEST_MP_TIMEOUT_SECS: u64 = 5;

pub fn test_config(database_path: &str, mp_base_url: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: database_path.to_string(),
        admin_api_key: TEST_ADMIN_KEY.to_string(),
        default_billing_days: BILLING_DAYS,
        mercadopago: MercadoPagoConfig {
            access_token: Some(TEST_MP_TOKEN.to_string()),
            api_base_url: mp_base_url.to_string(),
            timeout_secs: TEST_MP_TIMEOUT_SECS,
            ..MercadoPagoConfig::default()
        },
        cors_allowed_origins: Vec::new(),
    }
}

/// App state backed by a database file in a temp directory. In-memory SQLite
/// would give every pooled connection its own database.
pub struct TestContext {
    pub state: AppState,
    _dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_processor(UNREACHABLE_PROCESSOR)
    }

    pub fn with_processor(mp_base_url: &str) -> Self {
        Self::with_processor_timeout(mp_base_url, TEST_MP_TIMEOUT_SECS)
    }

    pub fn with_processor_timeout(mp_base_url: &str, timeout_secs: u64) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        let path = path.to_str().expect("Temp path is not UTF-8");

        let mut config = test_config(path, mp_base_url);
        config.mercadopago.timeout_secs = timeout_secs;
        let db = create_pool(path).expect("Failed to create pool");
        let mercadopago =
            MercadoPagoClient::new(&config.mercadopago).expect("Failed to build processor client");

        Self {
            state: AppState {
                db,
                config: Arc::new(config),
                mercadopago,
            },
            _dir: dir,
        }
    }

    pub fn conn(&self) -> DbConn {
        self.state.db.get().expect("Failed to get connection")
    }

    pub fn app(&self) -> Router {
        prospecta::handlers::router(self.state.clone())
    }
}

pub fn create_test_license(conn: &DbConn, key: &str, plan: Plan) -> License {
    licensing::create_license(
        conn,
        BILLING_DAYS,
        &CreateLicense {
            plan,
            key: Some(key.to_string()),
        },
        queries::now(),
    )
    .expect("Failed to create test license")
}

pub fn set_expires_at(conn: &DbConn, key: &str, expires_at: i64) {
    conn.execute(
        "UPDATE licenses SET expires_at = ?1 WHERE key = ?2",
        rusqlite::params![expires_at, key],
    )
    .expect("Failed to set expiry");
}

pub fn get_license(conn: &DbConn, key: &str) -> License {
    queries::get_license_by_key(conn, key)
        .expect("Query failed")
        .expect("License not found")
}

// ============ Request helpers ============

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", TEST_ADMIN_KEY))
        .body(Body::empty())
        .unwrap()
}

pub fn admin_post(uri: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", TEST_ADMIN_KEY));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
