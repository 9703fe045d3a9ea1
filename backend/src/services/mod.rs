use serde_json::Value;
use shared::shared_lucky_wheel::UserEntitlement;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::ApiError;
use crate::store::StoreError;
use crate::AppState;

pub mod order_service;
pub mod spin_service;
pub mod user_service;
pub mod voucher_service;
pub mod wheel_service;

/// Typed view of the stored user document. Unknown profile fields are
/// ignored here and preserved by the merge-style writes.
pub(crate) async fn load_user(state: &AppState) -> Result<UserEntitlement, ApiError> {
    let value = state
        .store
        .get("user")
        .await
        .unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(value).map_err(|e| ApiError::Store(StoreError::Serialize(e)))
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
