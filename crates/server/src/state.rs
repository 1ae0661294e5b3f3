// crates/server/src/state.rs
//! Application state for the Axum server, grounded on
//! `claude-view-server::state::AppState` (one `Arc`-wrapped struct shared
//! across every route handler via `axum::extract::State`).

use std::sync::Arc;
use std::time::Instant;

use scoutline_core::pipeline::{PipelineDeps, SearchBackend, VendorRefreshBackend};
use scoutline_core::{CompletionClient, RerankTransport};
use scoutline_jobs::JobRunner;
use scoutline_search::SearchEngine;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// C5 search facade. Kept as the concrete type (not `Arc<dyn
    /// SearchBackend>`) so routes can reach `find_similar`/`by_username`,
    /// which aren't part of the orchestrator-facing trait; it still
    /// coerces to `Arc<dyn SearchBackend>` wherever the pipeline needs it.
    pub search: Arc<SearchEngine>,
    /// C7 background job runner and event bus.
    pub jobs: Arc<JobRunner>,
    /// C4 reranker client, `None` if unconfigured (RERANK stage degrades
    /// to `RERANK_SKIPPED` rather than failing the pipeline).
    pub rerank: Option<Arc<dyn RerankTransport>>,
    /// C2 vendor refresh worker, `None` if unconfigured.
    pub vendor: Option<Arc<dyn VendorRefreshBackend>>,
    /// C3 fit-scoring completion client, `None` if unconfigured.
    pub fit: Option<Arc<dyn CompletionClient>>,
    /// Whether a vector-store URL was configured, for `/health`.
    pub vector_store_configured: bool,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Build a fresh `PipelineDeps` for one pipeline run. Cloning is just
    /// `Arc` bumps, cheap enough to do per-request.
    pub fn pipeline_deps(&self) -> PipelineDeps {
        PipelineDeps { rerank: self.rerank.clone(), vendor: self.vendor.clone(), fit: self.fit.clone() }
    }

    /// `search`, erased to the orchestrator-facing trait object.
    pub fn search_backend(&self) -> Arc<dyn SearchBackend> {
        Arc::clone(&self.search)
    }
}
