// crates/server/src/routes/mod.rs
//! Route module registry, grounded on `claude_view_server::routes::api_routes`
//! — one `router()` per feature area, merged under a single `Router<Arc<AppState>>`.
//! Unlike the teacher, §6's paths are bare (no `/api` prefix), so routers are
//! `.merge()`d rather than `.nest("/api", ...)`.

pub mod health;
pub mod job;
pub mod search;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().merge(health::router()).merge(job::router()).merge(search::router())
}
