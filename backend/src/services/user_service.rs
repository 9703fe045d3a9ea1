use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::load_user;
use crate::error::{json_response, ApiError};
use crate::AppState;

pub async fn get_user(State(state): State<AppState>) -> Response {
    let user = state.store.get("user").await.unwrap_or_else(|| json!({}));
    json_response(StatusCode::OK, json!({ "success": true, "data": user }))
}

/// Partial update: provided fields merge into the stored user document so
/// callers can patch one field without clobbering the rest.
pub async fn update_user(
    State(state): State<AppState>,
    Json(fields): Json<Value>,
) -> Result<Response, ApiError> {
    let merged = state.store.merge("user", fields).await?;
    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "data": merged }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddVoucherRequest {
    pub user_id: String,
    pub voucher_id: String,
}

/// Grants a voucher to the user. Idempotent: an id already claimed, or
/// already redeemed, is left alone.
pub async fn add_voucher(
    State(state): State<AppState>,
    Json(request): Json<AddVoucherRequest>,
) -> Result<Response, ApiError> {
    let lock = state.user_lock(&request.user_id).await;
    let _guard = lock.lock().await;

    let mut user = load_user(&state).await?;
    if user.id != request.user_id {
        return Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({ "success": false, "message": "User not found" }),
        ));
    }

    let already_claimed = user.vouchers.contains(&request.voucher_id);
    let already_used = user.used_vouchers.contains(&request.voucher_id);
    if !already_claimed && !already_used {
        user.vouchers.push(request.voucher_id.clone());
        info!("🎟️ user {} claimed voucher {}", user.id, request.voucher_id);
    }

    let merged = state.store.merge("user", serde_json::to_value(&user)?).await?;
    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "data": merged }),
    ))
}
