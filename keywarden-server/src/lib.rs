//! Shared state and HTTP API for the Keywarden license service.

pub mod client_ip;
pub mod config;
mod verify;

use crate::config::Config;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use keywarden_store::LicenseStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// Everything a request handler needs: the immutable configuration and a
/// handle to the license store.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: LicenseStore,
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the HTTP API router with the given state.
///
/// The caller must serve it with connection info
/// (`into_make_service_with_connect_info::<SocketAddr>()`) so the verify
/// handler can fall back to the peer address for origin resolution.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/verify", get(verify::verify_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
