// crates/server/src/lib.rs
//! HTTP surface for the discovery pipeline (§6): wires C5's search facade,
//! C6's orchestrator, and C7's job runner behind the `/search/*`, `/job/*`,
//! and `/health` routes, grounded on `claude_view_server::lib`'s
//! `create_app`/`cors_layer`/`router` shape.

pub mod config;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

pub use state::AppState;

/// Assemble the full axum `Router` for a given `AppState`: the §6 routes,
/// tracing middleware, a Prometheus `/metrics` endpoint, and (behind the
/// `swagger` feature) the OpenAPI doc + Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Router {
    let app = Router::new()
        .merge(routes::api_routes())
        .route("/metrics", get(metrics))
        .layer(scoutline_observability::http_trace_layer())
        .with_state(state);

    #[cfg(feature = "swagger")]
    let app = app.merge(openapi::swagger_ui());

    app
}

async fn metrics() -> String {
    scoutline_observability::render_metrics().unwrap_or_default()
}
