use axum::debug_handler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use rand::rngs::OsRng;
use rand::Rng;
use serde_json::{json, Value};
use shared::shared_lucky_wheel::{
    apply_reward, evaluate_spin, select_prize, Prize, SpinLogEntry, SpinRequest, SpinVerdict,
    WheelConfig,
};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::{load_user, now_rfc3339};
use crate::error::{json_response, ApiError};
use crate::AppState;

/// Outcome of one spin attempt after persistence. `PartialFailure` means
/// the allowance was already consumed; the caller must not treat it as a
/// retryable spin, only the reward step may be retried.
#[derive(Debug)]
pub(crate) enum SpinFlow {
    Accepted { user: Value, log: SpinLogEntry },
    Disabled,
    Cooldown { retry_after_seconds: u64 },
    Exhausted,
    UserMismatch,
    PartialFailure { message: &'static str },
}

/// The authoritative spin path. Reads config and entitlement, evaluates
/// the state machine, and persists the consumed spin BEFORE the prize is
/// drawn — a crash after that point leaves the spin spent, never doubled.
pub(crate) async fn perform_spin(
    state: &AppState,
    requested_user_id: Option<String>,
    now: OffsetDateTime,
) -> Result<SpinFlow, ApiError> {
    let wheel = state
        .store
        .get("lucky-wheel")
        .await
        .ok_or(ApiError::NotFound("Lucky wheel data not found"))?;

    let config: WheelConfig = match wheel.get("config") {
        Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
            warn!("malformed wheel config, using defaults: {}", e);
            WheelConfig::default()
        }),
        None => WheelConfig::default(),
    };
    let prizes: Vec<Prize> = match wheel.get("prizes") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| ApiError::Store(crate::store::StoreError::Serialize(e)))?,
        None => Vec::new(),
    };

    // Serialize attempts on the shared user record: two racing requests
    // must not both observe the same allowance. Requests that omit the
    // user id key on the stored record so they contend on the same lock.
    let lock_key = match &requested_user_id {
        Some(id) => id.clone(),
        None => load_user(state).await?.id,
    };
    let lock = state.user_lock(&lock_key).await;
    let _guard = lock.lock().await;

    let user = load_user(state).await?;
    if let Some(requested) = &requested_user_id {
        if !user.id.is_empty() && user.id != *requested {
            return Ok(SpinFlow::UserMismatch);
        }
    }

    let evaluation = evaluate_spin(&config, &user, now);
    match evaluation.verdict {
        SpinVerdict::Allowed => {}
        verdict => {
            // A restocked allowance is persisted even on a deny, so a
            // stale balance never leaks across cycles.
            if evaluation.reset_applied {
                state
                    .store
                    .merge("user", serde_json::to_value(&evaluation.entitlement)?)
                    .await?;
            }
            return Ok(match verdict {
                SpinVerdict::Disabled => SpinFlow::Disabled,
                SpinVerdict::CooldownActive { retry_after_seconds } => {
                    SpinFlow::Cooldown { retry_after_seconds }
                }
                _ => SpinFlow::Exhausted,
            });
        }
    }

    // The spin is spent here. If this write fails nothing was consumed and
    // the attempt surfaces as a 500; if anything after it fails the spin
    // stays consumed.
    state
        .store
        .merge("user", serde_json::to_value(&evaluation.entitlement)?)
        .await?;

    let mut rng = OsRng;
    let draw = rng.gen_range(0.0..1.0);
    let prize = match select_prize(&prizes, draw) {
        Some(prize) => prize.clone(),
        None => {
            error!("spin consumed but the prize table is empty");
            return Ok(SpinFlow::PartialFailure {
                message: "Spin was consumed but no prize is configured",
            });
        }
    };

    let (rewarded, mut log_entry) = apply_reward(&evaluation.entitlement, &prize, now);

    let reward_persisted = state
        .store
        .merge("user", serde_json::to_value(&rewarded)?)
        .await;
    let user_doc = match &reward_persisted {
        Ok(doc) => doc.clone(),
        Err(e) => {
            error!("reward application failed after spin was consumed: {}", e);
            // The log still records what was actually applied.
            log_entry.points_earned = 0;
            serde_json::to_value(&evaluation.entitlement)?
        }
    };

    let log_appended = append_log(state, &log_entry).await;
    if let Err(e) = &log_appended {
        error!("spin log append failed: {:?}", e);
    }
    if reward_persisted.is_err() || log_appended.is_err() {
        return Ok(SpinFlow::PartialFailure {
            message: "Spin was consumed but the reward could not be fully applied. Please retry the reward step.",
        });
    }

    Ok(SpinFlow::Accepted {
        user: user_doc,
        log: log_entry,
    })
}

async fn append_log(state: &AppState, entry: &SpinLogEntry) -> Result<(), ApiError> {
    let entry_value = serde_json::to_value(entry)?;
    state
        .store
        .update("lucky-wheel", move |doc| {
            if let Some(logs) = doc.get_mut("spinLogs").and_then(Value::as_array_mut) {
                logs.push(entry_value);
            } else if let Some(obj) = doc.as_object_mut() {
                obj.insert("spinLogs".to_string(), Value::Array(vec![entry_value]));
            }
        })
        .await?;
    Ok(())
}

#[debug_handler]
pub async fn spin_wheel(
    State(state): State<AppState>,
    Json(payload): Json<SpinRequest>,
) -> Result<Response, ApiError> {
    let now = payload.timestamp.unwrap_or_else(OffsetDateTime::now_utc);

    match perform_spin(&state, payload.user_id, now).await? {
        SpinFlow::Accepted { user, log } => {
            info!(
                "🎡 WHEEL SPIN: user {} won prize {} (+{} points)",
                log.user_id,
                log.prize_id.as_deref().unwrap_or("?"),
                log.points_earned
            );
            Ok(json_response(
                StatusCode::OK,
                json!({
                    "success": true,
                    "message": "Spin accepted",
                    "data": { "user": user, "log": log }
                }),
            ))
        }
        SpinFlow::Disabled => Ok(json_response(
            StatusCode::FORBIDDEN,
            json!({ "success": false, "message": "Lucky wheel is currently disabled" }),
        )),
        SpinFlow::Cooldown { retry_after_seconds } => Ok(json_response(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "success": false,
                "message": format!("Please wait {} seconds before next spin", retry_after_seconds),
                "retryAfterSeconds": retry_after_seconds
            }),
        )),
        SpinFlow::Exhausted => Ok(json_response(
            StatusCode::BAD_REQUEST,
            json!({ "success": false, "message": "No remaining spins for today" }),
        )),
        SpinFlow::UserMismatch => Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({ "success": false, "message": "User not found" }),
        )),
        SpinFlow::PartialFailure { message } => Ok(json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "success": false, "message": message }),
        )),
    }
}

/// Legacy fallback path: accepts a client-shaped log entry and appends it
/// as-is. The authoritative path is `/api/lucky-wheel/spin`.
pub async fn append_client_spin_log(
    State(state): State<AppState>,
    Json(mut spin_data): Json<Value>,
) -> Result<Response, ApiError> {
    if let Some(obj) = spin_data.as_object_mut() {
        obj.entry("timestamp")
            .or_insert_with(|| Value::String(now_rfc3339()));
    }
    if state.store.get("lucky-wheel").await.is_some() {
        state
            .store
            .update("lucky-wheel", move |doc| {
                if let Some(logs) = doc.get_mut("spinLogs").and_then(Value::as_array_mut) {
                    logs.push(spin_data);
                }
            })
            .await?;
    }
    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "message": "Spin result logged successfully" }),
    ))
}
