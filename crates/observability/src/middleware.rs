// crates/observability/src/middleware.rs
//! HTTP-layer tracing, grounded on `claude-view-server::lib`'s
//! `.layer(TraceLayer::new_for_http())` on its axum router.

use tower_http::trace::TraceLayer;

/// A `tower-http` trace layer configured for the default axum request/
/// response types, for `Router::layer`.
pub fn http_trace_layer() -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}
