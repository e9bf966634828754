//! Response envelope and error mapping.
//!
//! Every response, success or failure, carries the same envelope:
//! `{"success": true, "data": ...}` or
//! `{"success": false, "error": {"message": ..., "code": ...}}` where `code`
//! repeats the HTTP status numerically.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use procura_core::DomainError;
use procura_infra::{ServiceError, StoreError};

pub fn json_ok(status: StatusCode, data: serde_json::Value) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": true,
            "data": data,
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": {
                "message": message.into(),
                "code": status.as_u16(),
            },
        })),
    )
        .into_response()
}

/// Map a service failure onto the envelope.
///
/// Gate failures keep their domain message; backend failures are logged here
/// and surface as an opaque 500.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, msg)
        }
        ServiceError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, msg)
        }
        ServiceError::Domain(DomainError::NotFound(msg)) => json_error(StatusCode::NOT_FOUND, msg),
        ServiceError::Domain(DomainError::Conflict(msg)) => json_error(StatusCode::CONFLICT, msg),
        ServiceError::Store(StoreError::Conflict(msg)) => json_error(StatusCode::CONFLICT, msg),
        ServiceError::Store(err) => {
            tracing::error!(error = %err, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
        }
    }
}
