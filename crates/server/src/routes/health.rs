// crates/server/src/routes/health.rs
//! `GET /health` — liveness including dataset/vector-store reachability
//! (§6: "Liveness including dataset availability").

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub vector_store_configured: bool,
    pub rerank_configured: bool,
    pub vendor_configured: bool,
    pub fit_configured: bool,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        vector_store_configured: state.vector_store_configured,
        rerank_configured: state.rerank.is_some(),
        vendor_configured: state.vendor.is_some(),
        fit_configured: state.fit.is_some(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
