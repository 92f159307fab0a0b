//! HTTP route handlers.

pub mod breaches;

use axum::Json;
use serde_json::{Value, json};

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
