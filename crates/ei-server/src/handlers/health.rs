//! `GET /health` — basic liveness check, no auth, no state lookups.

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
