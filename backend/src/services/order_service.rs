use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::constants::BASE_SHIPPING_FEE;
use tracing::info;
use uuid::Uuid;

use super::{load_user, now_rfc3339};
use crate::error::{json_response, ApiError};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Value,
    pub quantity: u64,
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrderRequest {
    pub user_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub voucher_id: Option<String>,
    pub points_used: u64,
    pub payment_method: Option<String>,
    pub shipping_address: Option<String>,
}

/// Redeemable voucher definition, read from the inventory or from a wheel
/// voucher template.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
struct VoucherMeta {
    code: String,
    percent: Option<u64>,
    amount: Option<u64>,
    discount: Option<u64>,
    free_shipping: bool,
    quantity: u64,
}

impl VoucherMeta {
    fn discount_for(&self, subtotal: u64) -> u64 {
        if let Some(percent) = self.percent {
            return subtotal * percent / 100;
        }
        if let Some(amount) = self.amount {
            return amount;
        }
        self.discount.unwrap_or(0)
    }

    fn grants_free_shipping(&self) -> bool {
        self.free_shipping || self.code.to_uppercase() == "FREESHIP"
    }
}

pub async fn get_orders(State(state): State<AppState>) -> Response {
    let orders = state
        .store
        .get("orders")
        .await
        .filter(|v| v.is_array())
        .unwrap_or_else(|| json!([]));
    json_response(StatusCode::OK, json!({ "success": true, "data": orders }))
}

/// Server-authoritative checkout. Validates and redeems the voucher (a
/// one-way move into `usedVouchers`), spends points, and appends the
/// priced order. The client never computes the totals.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, ApiError> {
    if request.items.is_empty() {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            json!({ "success": false, "message": "Order has no items" }),
        ));
    }

    // Checkout mutates the same user record as spins; take the same lock.
    let lock_key = match &request.user_id {
        Some(id) => id.clone(),
        None => load_user(&state).await?.id,
    };
    let lock = state.user_lock(&lock_key).await;
    let _guard = lock.lock().await;

    let user = load_user(&state).await?;
    if let Some(requested) = &request.user_id {
        if !user.id.is_empty() && user.id != *requested {
            return Ok(json_response(
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": "User not found" }),
            ));
        }
    }

    let subtotal: u64 = request
        .items
        .iter()
        .map(|item| item.price * item.quantity)
        .sum();

    let mut voucher_discount = 0u64;
    let mut free_shipping = false;
    let mut decrement_inventory = false;
    if let Some(voucher_id) = &request.voucher_id {
        // Redemption is a precondition-checked, single-use transition.
        if user.used_vouchers.contains(voucher_id) {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": "Voucher has already been used" }),
            ));
        }
        if !user.vouchers.contains(voucher_id) {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": "Voucher is not available for this user" }),
            ));
        }
        let Some((meta, from_inventory)) = find_voucher_meta(&state, voucher_id).await else {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": "Voucher not found" }),
            ));
        };
        if from_inventory && meta.quantity == 0 {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": "Voucher is out of stock" }),
            ));
        }
        voucher_discount = meta.discount_for(subtotal);
        free_shipping = meta.grants_free_shipping();
        decrement_inventory = from_inventory;
    }

    let shipping_base = if subtotal > 0 { BASE_SHIPPING_FEE } else { 0 };
    let shipping_fee = if free_shipping { 0 } else { shipping_base };
    let points_applied = request
        .points_used
        .min(user.points)
        .min(subtotal.saturating_sub(voucher_discount));
    let discount = voucher_discount + points_applied;
    let total = (subtotal + shipping_fee).saturating_sub(discount);

    let mut updated = user.clone();
    if let Some(voucher_id) = &request.voucher_id {
        updated.vouchers.retain(|v| v != voucher_id);
        updated.used_vouchers.push(voucher_id.clone());
    }
    updated.points -= points_applied;
    state
        .store
        .merge("user", serde_json::to_value(&updated)?)
        .await?;

    if decrement_inventory {
        if let Some(voucher_id) = request.voucher_id.clone() {
            state
                .store
                .update("vouchers", move |slot| {
                    if let Some(items) = slot.as_array_mut() {
                        for item in items {
                            if item.get("id").and_then(Value::as_str) == Some(voucher_id.as_str()) {
                                let quantity =
                                    item.get("quantity").and_then(Value::as_u64).unwrap_or(0);
                                item["quantity"] = json!(quantity.saturating_sub(1));
                            }
                        }
                    }
                })
                .await?;
        }
    }

    let order = json!({
        "id": format!("order-{}", Uuid::new_v4()),
        "userId": updated.id,
        "items": serde_json::to_value(&request.items)?,
        "subtotal": subtotal,
        "shippingFee": shipping_fee,
        "freeShipping": free_shipping,
        "voucherId": request.voucher_id,
        "discount": discount,
        "pointsUsed": points_applied,
        "total": total,
        "paymentMethod": request.payment_method.as_deref().unwrap_or("cod"),
        "shippingAddress": request.shipping_address,
        "status": "pending",
        "createdAt": now_rfc3339(),
    });

    let stored = order.clone();
    state
        .store
        .update("orders", move |slot| {
            if let Some(items) = slot.as_array_mut() {
                items.push(stored);
            } else {
                *slot = Value::Array(vec![stored]);
            }
        })
        .await?;

    info!(
        "🛒 order placed for user {}: total {} (discount {}, points spent {})",
        updated.id, total, discount, points_applied
    );
    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "data": order }),
    ))
}

async fn find_voucher_meta(state: &AppState, voucher_id: &str) -> Option<(VoucherMeta, bool)> {
    if let Some(items) = state.store.get("vouchers").await {
        if let Some(items) = items.as_array() {
            for item in items {
                if item.get("id").and_then(Value::as_str) == Some(voucher_id) {
                    let meta = serde_json::from_value(item.clone()).unwrap_or_default();
                    return Some((meta, true));
                }
            }
        }
    }
    // Wheel-won vouchers resolve against the template table; they carry no
    // inventory count.
    if let Some(wheel) = state.store.get("lucky-wheel").await {
        if let Some(template) = wheel.get("voucherTemplates").and_then(|t| t.get(voucher_id)) {
            let meta: VoucherMeta =
                serde_json::from_value(template.clone()).unwrap_or_default();
            return Some((meta, false));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    fn state_with(db: Value) -> AppState {
        let path =
            std::env::temp_dir().join(format!("unionmart-order-{}.json", Uuid::new_v4()));
        std::fs::write(&path, db.to_string()).expect("seed db file");
        AppState::new(JsonStore::open(path).expect("temp store should open"))
    }

    fn order_request(voucher: Option<&str>, points: u64) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: Some("user-1".to_string()),
            items: vec![OrderItem {
                product_id: json!(1),
                quantity: 2,
                price: 100_000,
                product: None,
            }],
            voucher_id: voucher.map(str::to_string),
            points_used: points,
            payment_method: None,
            shipping_address: None,
        }
    }

    #[tokio::test]
    async fn voucher_redemption_is_single_use() {
        // P4: the id moves to usedVouchers once and a second redemption
        // attempt is rejected.
        let state = state_with(json!({
            "user": { "id": "user-1", "vouchers": ["voucher-50k"], "points": 0 },
            "vouchers": [
                { "id": "voucher-50k", "code": "SALE50", "amount": 50000, "quantity": 2 }
            ]
        }));

        let response = create_order(State(state.clone()), Json(order_request(Some("voucher-50k"), 0)))
            .await
            .expect("order should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let user = state.store.get("user").await.expect("user should exist");
        assert_eq!(user["vouchers"], json!([]));
        assert_eq!(user["usedVouchers"], json!(["voucher-50k"]));
        let vouchers = state.store.get("vouchers").await.expect("inventory should exist");
        assert_eq!(vouchers[0]["quantity"], 1);

        let response = create_order(State(state.clone()), Json(order_request(Some("voucher-50k"), 0)))
            .await
            .expect("handler should not error");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let user = state.store.get("user").await.expect("user should exist");
        assert_eq!(user["usedVouchers"], json!(["voucher-50k"]));
    }

    #[tokio::test]
    async fn order_totals_follow_the_redemption_rules() {
        // subtotal 200k, flat 50k voucher, base shipping 30k.
        let state = state_with(json!({
            "user": { "id": "user-1", "vouchers": ["voucher-50k"], "points": 0 },
            "vouchers": [
                { "id": "voucher-50k", "code": "SALE50", "amount": 50000, "quantity": 1 }
            ]
        }));
        create_order(State(state.clone()), Json(order_request(Some("voucher-50k"), 0)))
            .await
            .expect("order should succeed");

        let orders = state.store.get("orders").await.expect("orders should exist");
        let order = &orders[0];
        assert_eq!(order["subtotal"], 200_000);
        assert_eq!(order["discount"], 50_000);
        assert_eq!(order["shippingFee"], 30_000);
        assert_eq!(order["total"], 180_000);
        assert_eq!(order["status"], "pending");
    }

    #[tokio::test]
    async fn percent_voucher_discount_is_floored() {
        let state = state_with(json!({
            "user": { "id": "user-1", "vouchers": ["voucher-7p"], "points": 0 },
            "vouchers": [
                { "id": "voucher-7p", "code": "SALE7", "percent": 7, "quantity": 1 }
            ]
        }));
        let mut request = order_request(Some("voucher-7p"), 0);
        request.items = vec![OrderItem {
            product_id: json!(2),
            quantity: 1,
            price: 10_050,
            product: None,
        }];
        create_order(State(state.clone()), Json(request))
            .await
            .expect("order should succeed");

        let orders = state.store.get("orders").await.expect("orders should exist");
        // floor(10050 * 7 / 100) = 703
        assert_eq!(orders[0]["discount"], 703);
    }

    #[tokio::test]
    async fn free_shipping_voucher_zeroes_the_fee() {
        let state = state_with(json!({
            "user": { "id": "user-1", "vouchers": ["voucher-ship"], "points": 0 },
            "vouchers": [
                { "id": "voucher-ship", "code": "XYZ", "freeShipping": true, "quantity": 1 }
            ]
        }));
        create_order(State(state.clone()), Json(order_request(Some("voucher-ship"), 0)))
            .await
            .expect("order should succeed");

        let orders = state.store.get("orders").await.expect("orders should exist");
        assert_eq!(orders[0]["shippingFee"], 0);
        assert_eq!(orders[0]["freeShipping"], true);
        // No monetary discount from a shipping-only voucher.
        assert_eq!(orders[0]["discount"], 0);
    }

    #[tokio::test]
    async fn points_spend_is_capped_by_balance_and_subtotal() {
        let state = state_with(json!({
            "user": { "id": "user-1", "vouchers": [], "points": 120 }
        }));
        let mut request = order_request(None, 1_000_000);
        request.items = vec![OrderItem {
            product_id: json!(3),
            quantity: 1,
            price: 100,
            product: None,
        }];
        create_order(State(state.clone()), Json(request))
            .await
            .expect("order should succeed");

        let orders = state.store.get("orders").await.expect("orders should exist");
        // Capped at the subtotal, not the 120-point balance.
        assert_eq!(orders[0]["pointsUsed"], 100);
        let user = state.store.get("user").await.expect("user should exist");
        assert_eq!(user["points"], 20);
    }

    #[tokio::test]
    async fn unclaimed_voucher_is_rejected() {
        let state = state_with(json!({
            "user": { "id": "user-1", "vouchers": [], "points": 0 },
            "vouchers": [
                { "id": "voucher-50k", "code": "SALE50", "amount": 50000, "quantity": 1 }
            ]
        }));
        let response = create_order(State(state.clone()), Json(order_request(Some("voucher-50k"), 0)))
            .await
            .expect("handler should not error");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.get("orders").await.is_none());
    }
}
