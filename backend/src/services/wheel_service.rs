use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{json_response, ApiError};
use crate::AppState;

/// The whole lucky-wheel document: config, prize table, voucher templates
/// and spin logs. Served uncached so operator edits show up immediately.
pub async fn get_lucky_wheel(State(state): State<AppState>) -> Result<Response, ApiError> {
    let wheel = state
        .store
        .get("lucky-wheel")
        .await
        .ok_or(ApiError::NotFound("Lucky wheel data not found"))?;

    let body = json!({ "success": true, "data": wheel });
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from(body.to_string()))
        .unwrap())
}

/// Partial config update: provided fields merge into the existing config,
/// everything else is untouched.
pub async fn update_config(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Response, ApiError> {
    if state.store.get("lucky-wheel").await.is_none() {
        return Err(ApiError::NotFound("Lucky wheel data not found"));
    }

    let merged = state
        .store
        .update("lucky-wheel", move |doc| {
            let obj = doc.as_object_mut()?;
            let config = obj.entry("config").or_insert_with(|| json!({}));
            if !config.is_object() {
                *config = json!({});
            }
            if let (Some(target), Value::Object(fields)) = (config.as_object_mut(), patch) {
                for (key, value) in fields {
                    target.insert(key, value);
                }
            }
            Some(config.clone())
        })
        .await?;

    match merged {
        Some(config) => Ok(json_response(
            StatusCode::OK,
            json!({
                "success": true,
                "message": "Config updated successfully",
                "data": config
            }),
        )),
        None => Err(ApiError::NotFound("Lucky wheel data not found")),
    }
}

pub async fn get_voucher_template(
    State(state): State<AppState>,
    Path(voucher_id): Path<String>,
) -> Result<Response, ApiError> {
    let wheel = state
        .store
        .get("lucky-wheel")
        .await
        .ok_or(ApiError::NotFound("Voucher templates not found"))?;
    let templates = wheel
        .get("voucherTemplates")
        .filter(|t| t.is_object())
        .ok_or(ApiError::NotFound("Voucher templates not found"))?;
    let template = templates
        .get(&voucher_id)
        .cloned()
        .ok_or(ApiError::NotFound("Voucher template not found"))?;

    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "data": template }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    fn state_with(db: Value) -> AppState {
        let path =
            std::env::temp_dir().join(format!("unionmart-wheel-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, db.to_string()).expect("seed db file");
        AppState::new(JsonStore::open(path).expect("temp store should open"))
    }

    #[tokio::test]
    async fn config_update_merges_partial_fields() {
        let state = state_with(json!({
            "lucky-wheel": {
                "config": { "enabled": true, "dailySpins": 3, "resetTime": "00:00", "spinCooldown": 0 },
                "prizes": [],
                "spinLogs": []
            }
        }));

        let response = update_config(
            State(state.clone()),
            Json(json!({ "spinCooldown": 5, "resetTime": "06:00" })),
        )
        .await
        .expect("update should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let wheel = state.store.get("lucky-wheel").await.expect("wheel should exist");
        assert_eq!(wheel["config"]["spinCooldown"], 5);
        assert_eq!(wheel["config"]["resetTime"], "06:00");
        // Untouched fields keep their values.
        assert_eq!(wheel["config"]["dailySpins"], 3);
        assert_eq!(wheel["config"]["enabled"], true);
    }

    #[tokio::test]
    async fn config_update_without_wheel_document_is_not_found() {
        let state = state_with(json!({}));
        let result = update_config(State(state), Json(json!({ "spinCooldown": 5 }))).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn voucher_template_lookup() {
        let state = state_with(json!({
            "lucky-wheel": {
                "config": {},
                "voucherTemplates": {
                    "voucher-50k": { "title": "Giảm 50k", "amount": 50000 }
                }
            }
        }));

        let response = get_voucher_template(
            State(state.clone()),
            Path("voucher-50k".to_string()),
        )
        .await
        .expect("lookup should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let missing = get_voucher_template(State(state), Path("voucher-404".to_string())).await;
        assert!(matches!(missing, Err(ApiError::NotFound("Voucher template not found"))));
    }
}
