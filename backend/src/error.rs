use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::store::StoreError;

/// Unexpected failures only. Deny outcomes (disabled wheel, cooldown,
/// exhausted allowance) are ordinary control flow and serialized by the
/// handlers themselves as `{ success: false }` bodies.
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    NotFound(&'static str),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Store(StoreError::Serialize(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Store(e) => {
                tracing::error!("storage failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        };
        json_response(status, json!({ "success": false, "message": message }))
    }
}

/// Builds a JSON response the way the handlers expect: explicit status,
/// `application/json`, body rendered from a `json!` document.
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
