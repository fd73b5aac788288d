//! API module for the Kopi gateway

pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::listener::ListenerState;
use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub channel: String,
    pub contract: String,
    pub identity_count: usize,
    pub listener: ListenerState,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
///
/// Ready once at least one identity is provisioned. A disconnected listener
/// is reported but does not make the gateway unready.
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let identity_count = state
        .sessions
        .store()
        .list()
        .await
        .map(|names| names.len())
        .unwrap_or(0);

    Json(ReadyResponse {
        ready: identity_count > 0,
        channel: state.sessions.channel().to_string(),
        contract: state.sessions.contract_name().to_string(),
        identity_count,
        listener: state.listener.state(),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Browser dashboards call the API from other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Supply-chain transactions
        .route("/api/create", post(handlers::create_batch))
        .route("/api/transport-lokal", post(handlers::transport_lokal))
        .route("/api/receive-warehouse", post(handlers::receive_warehouse))
        .route("/api/process-qc", post(handlers::process_qc))
        .route("/api/approve-export", post(handlers::approve_export))
        .route("/api/start-shipment", post(handlers::start_shipment))
        .route("/api/confirm-import", post(handlers::confirm_import))
        .route("/api/add-checkpoint", post(handlers::add_checkpoint))
        // Wallet endpoints
        .route("/api/init-wallet", post(handlers::init_wallet))
        .route("/api/wallet/{msp_id}", get(handlers::wallet_balance))
        // Queries
        .route("/api/all-batches", get(handlers::all_batches))
        .route("/api/batch/{id}", get(handlers::batch_by_id))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
