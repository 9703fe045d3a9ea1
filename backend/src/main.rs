use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::services::{
    now_rfc3339, order_service, spin_service, user_service, voucher_service, wheel_service,
};
use crate::store::JsonStore;

mod error;
mod logging;
mod services;
mod store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonStore>,
    /// One async mutex per user id. Spins and checkout both read-modify-
    /// write the shared user record; holding this across the whole window
    /// is what keeps two racing requests from spending one allowance twice.
    user_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(store: JsonStore) -> Self {
        Self {
            store: Arc::new(store),
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "UnionMart API Server is running",
        "timestamp": now_rfc3339()
    }))
}

async fn welcome() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to UnionMart API Server",
        "endpoints": {
            "health": "/api/health",
            "luckyWheel": "/api/lucky-wheel",
            "user": "/api/user",
            "vouchers": "/api/vouchers",
            "orders": "/api/orders"
        }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::setup();
    dotenvy::from_path(".env").ok();

    let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "db.json".to_string());
    let state = AppState::new(JsonStore::open(&db_path)?);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
            Method::DELETE,
        ])
        .allow_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(welcome))
        .route("/api/health", get(health_check))
        .route("/api/lucky-wheel", get(wheel_service::get_lucky_wheel))
        .route("/api/lucky-wheel/config", put(wheel_service::update_config))
        .route("/api/lucky-wheel/spin", post(spin_service::spin_wheel))
        .route("/api/lucky-wheel/spin-log", post(spin_service::append_client_spin_log))
        .route(
            "/api/lucky-wheel/voucher-templates/:voucher_id",
            get(wheel_service::get_voucher_template),
        )
        .route(
            "/api/user",
            get(user_service::get_user).put(user_service::update_user),
        )
        .route("/api/user/add-voucher", post(user_service::add_voucher))
        .route(
            "/api/vouchers",
            get(voucher_service::get_vouchers).post(voucher_service::create_voucher),
        )
        .route(
            "/api/orders",
            get(order_service::get_orders).post(order_service::create_order),
        )
        .layer(cors)
        .with_state(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("🚀 UnionMart API server running on http://{}", addr);
    info!("📊 Database: {}", db_path);
    info!("🌐 Health check: http://{}/api/health", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
