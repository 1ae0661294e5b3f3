// crates/observability/src/lib.rs
//! Tracing, error-reporting, and metrics setup shared by every binary in
//! the workspace (C7's job worker, C8's ingestion runner, `scoutline-server`).

pub mod init;
pub mod metrics;
pub mod middleware;

pub use init::{init, ObservabilityConfig, ObservabilityGuard};
pub use middleware::http_trace_layer;
