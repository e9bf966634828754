use axum::http::StatusCode;
use serde_json::json;

use crate::app::errors;

/// Liveness probe. Mounted outside the tenant middleware.
pub async fn healthz() -> axum::response::Response {
    errors::json_ok(StatusCode::OK, json!({ "status": "ok" }))
}
