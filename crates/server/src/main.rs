// crates/server/src/main.rs
//! Process entry point, grounded on `claude_view_server::main`'s bootstrap
//! sequence: load config, build collaborator clients, assemble state,
//! install observability, serve.

use std::sync::Arc;
use std::time::Instant;

use scoutline_brightdata::{BrightDataConfig, BrightDataWorker};
use scoutline_core::pipeline::VendorRefreshBackend;
use scoutline_core::{CompletionClient, HttpCompletionClient, HttpRerankTransport, RerankTransport};
use scoutline_jobs::{JobRunner, JobRunnerConfig};
use scoutline_search::{EmbeddingClient, HttpEmbeddingClient, HttpVectorStoreClient, SearchEngine, VectorStoreClient};

use scoutline_server::config::{self, Config};
use scoutline_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    let _observability_guard = scoutline_observability::init(scoutline_observability::ObservabilityConfig::default());
    scoutline_observability::init_metrics();

    let http = reqwest::Client::builder().timeout(config.http_timeout).build()?;

    // The vector store is the only mandatory external collaborator — SEARCH
    // is the one non-optional pipeline stage, so a missing URL is fatal at
    // startup rather than a per-request `ConfigError` (§7).
    let vector_store_url = config
        .vector_store_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("SCOUTLINE_VECTOR_STORE_URL must be set"))?;
    let store: Arc<dyn VectorStoreClient> = Arc::new(HttpVectorStoreClient::new(http.clone(), vector_store_url));
    let embedder: Option<Arc<dyn EmbeddingClient>> = config.embedding_url.clone().map(|url| {
        Arc::new(HttpEmbeddingClient::new(http.clone(), url, config.embedding_model.clone())) as Arc<dyn EmbeddingClient>
    });
    let search = Arc::new(SearchEngine::new(store, embedder));

    let rerank: Option<Arc<dyn RerankTransport>> = config
        .reranker_url
        .clone()
        .map(|url| Arc::new(HttpRerankTransport::new(http.clone(), url)) as Arc<dyn RerankTransport>);
    let fit: Option<Arc<dyn CompletionClient>> = config
        .llm_url
        .clone()
        .map(|url| Arc::new(HttpCompletionClient::new(http.clone(), url)) as Arc<dyn CompletionClient>);
    let vendor: Option<Arc<dyn VendorRefreshBackend>> =
        if config.brightdata_api_key.is_some() && !config.brightdata_dataset_ids.is_empty() {
            let bd_config = BrightDataConfig {
                api_key: config.brightdata_api_key.clone().unwrap_or_default(),
                max_urls_per_request: config.brightdata_max_urls_per_request,
                max_workers: config.brightdata_max_workers,
                ..Default::default()
            };
            Some(Arc::new(BrightDataWorker::new(http.clone(), bd_config, config.brightdata_dataset_ids.clone()))
                as Arc<dyn VendorRefreshBackend>)
        } else {
            None
        };

    let state = Arc::new(AppState {
        start_time: Instant::now(),
        search,
        jobs: Arc::new(JobRunner::new(JobRunnerConfig::default())),
        rerank,
        vendor,
        fit,
        vector_store_configured: true,
    });

    let app = scoutline_server::build_router(state);
    let port = config::get_port();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "scoutline-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
