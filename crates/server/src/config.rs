// crates/server/src/config.rs
//! Server configuration loaded from the environment (§6 "Environment").

use std::collections::HashMap;
use std::time::Duration;

use scoutline_types::Platform;

const DEFAULT_PORT: u16 = 8787;

/// Get the server port from environment or use the default.
pub fn get_port() -> u16 {
    std::env::var("SCOUTLINE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// External collaborator endpoints and credentials (§6 "Environment": vector
/// index path, embedding endpoint + key, reranker endpoint + key, vendor API
/// key(s) and dataset ids per platform, LLM endpoint + key, default timeouts).
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub vector_store_url: Option<String>,
    pub embedding_url: Option<String>,
    pub embedding_model: String,
    pub reranker_url: Option<String>,
    pub llm_url: Option<String>,
    pub brightdata_api_key: Option<String>,
    pub brightdata_dataset_ids: HashMap<Platform, String>,
    pub brightdata_max_urls_per_request: usize,
    pub brightdata_max_workers: usize,
    pub http_timeout: Duration,
}

impl Config {
    /// Load from environment variables, falling back to `None`/defaults for
    /// anything unset — missing collaborator config degrades the stage that
    /// needs it (RERANK_SKIPPED/LLM_FIT_SKIPPED) rather than failing startup.
    pub fn from_env() -> Self {
        let mut dataset_ids = HashMap::new();
        if let Ok(id) = std::env::var("SCOUTLINE_BRIGHTDATA_DATASET_ID_INSTAGRAM") {
            dataset_ids.insert(Platform::Instagram, id);
        }
        if let Ok(id) = std::env::var("SCOUTLINE_BRIGHTDATA_DATASET_ID_TIKTOK") {
            dataset_ids.insert(Platform::Tiktok, id);
        }

        Self {
            vector_store_url: std::env::var("SCOUTLINE_VECTOR_STORE_URL").ok(),
            embedding_url: std::env::var("SCOUTLINE_EMBEDDING_URL").ok(),
            embedding_model: std::env::var("SCOUTLINE_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            reranker_url: std::env::var("SCOUTLINE_RERANKER_URL").ok(),
            llm_url: std::env::var("SCOUTLINE_LLM_URL").ok(),
            brightdata_api_key: std::env::var("SCOUTLINE_BRIGHTDATA_API_KEY").ok(),
            brightdata_dataset_ids: dataset_ids,
            brightdata_max_urls_per_request: std::env::var("SCOUTLINE_BRIGHTDATA_MAX_URLS_PER_REQUEST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            brightdata_max_workers: std::env::var("SCOUTLINE_BRIGHTDATA_MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            http_timeout: Duration::from_secs(
                std::env::var("SCOUTLINE_HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_yields_unconfigured_collaborators() {
        // Guard against leftover state from other tests running in the same
        // process (env vars are process-global).
        for key in [
            "SCOUTLINE_VECTOR_STORE_URL",
            "SCOUTLINE_EMBEDDING_URL",
            "SCOUTLINE_RERANKER_URL",
            "SCOUTLINE_LLM_URL",
        ] {
            std::env::remove_var(key);
        }
        let config = Config::from_env();
        assert!(config.vector_store_url.is_none());
        assert!(config.reranker_url.is_none());
    }
}
