use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use super::now_rfc3339;
use crate::error::{json_response, ApiError};
use crate::AppState;

pub async fn get_vouchers(State(state): State<AppState>) -> Response {
    let vouchers = state
        .store
        .get("vouchers")
        .await
        .filter(|v| v.is_array())
        .unwrap_or_else(|| json!([]));
    json_response(StatusCode::OK, json!({ "success": true, "data": vouchers }))
}

/// Adds a voucher definition to the inventory, stamping a generated id and
/// creation time when the caller did not provide them.
pub async fn create_voucher(
    State(state): State<AppState>,
    Json(mut voucher): Json<Value>,
) -> Result<Response, ApiError> {
    if let Some(fields) = voucher.as_object_mut() {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(format!("voucher-{}", Uuid::new_v4())));
        fields
            .entry("createdAt")
            .or_insert_with(|| Value::String(now_rfc3339()));
    }

    let stored = voucher.clone();
    state
        .store
        .update("vouchers", move |slot| {
            if let Some(items) = slot.as_array_mut() {
                items.push(stored);
            } else {
                *slot = Value::Array(vec![stored]);
            }
        })
        .await?;

    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "data": voucher }),
    ))
}
