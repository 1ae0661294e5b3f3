// crates/server/tests/scenarios.rs
//! End-to-end scenarios S1, S2, S3, S6 (spec.md §8), driven through the real
//! HTTP surface with stub `VectorStoreClient`/`RerankTransport`/
//! `VendorRefreshBackend`/`CompletionClient` implementations — matching the
//! teacher's `axum-test` integration-test style. S4 (BrightData chunking)
//! and S5 (ingestion cache-hit) are exercised where those features live
//! (`scoutline-brightdata`/`scoutline-ingest`), since neither has an HTTP
//! surface of its own to drive through this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::json;

use scoutline_core::pipeline::{ProgressSink, VendorRefreshBackend, VendorRefreshOutcome};
use scoutline_core::{CompletionClient, ExternalError, RerankTransport};
use scoutline_jobs::{JobRunner, JobRunnerConfig};
use scoutline_search::{DenseHit, Facet, LexicalHit, SearchEngine, VectorStoreClient};
use scoutline_types::{CanonicalProfile, Platform, SearchFilters};

use scoutline_server::{build_router, AppState};

fn profile(id: &str, username: &str, platform: Platform) -> CanonicalProfile {
    CanonicalProfile { lance_id: id.into(), username: username.into(), platform: Some(platform), ..Default::default() }
}

/// A `VectorStoreClient` whose dense/lexical hit lists are set up by hand so
/// tests control ranking directly, rather than depending on real embedding
/// semantics.
struct ScenarioStore {
    dense_profile: Vec<DenseHit>,
    dense_posts: Vec<DenseHit>,
    lexical: Vec<LexicalHit>,
    profiles: HashMap<String, CanonicalProfile>,
}

#[async_trait]
impl VectorStoreClient for ScenarioStore {
    async fn dense_search(
        &self,
        facet: Facet,
        _vector: &[f32],
        _limit: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<DenseHit>, ExternalError> {
        Ok(match facet {
            Facet::Profile => self.dense_profile.clone(),
            Facet::Posts => self.dense_posts.clone(),
        })
    }

    async fn lexical_search(
        &self,
        _include_posts: bool,
        _query: &str,
        _limit: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<LexicalHit>, ExternalError> {
        Ok(self.lexical.clone())
    }

    async fn fetch_profiles(&self, lance_ids: &[String]) -> Result<Vec<CanonicalProfile>, ExternalError> {
        Ok(lance_ids.iter().filter_map(|id| self.profiles.get(id).cloned()).collect())
    }

    async fn fetch_profile_vector(&self, _lance_id: &str) -> Result<Option<Vec<f32>>, ExternalError> {
        Ok(None)
    }

    async fn lookup_by_username(&self, username: &str) -> Result<Option<CanonicalProfile>, ExternalError> {
        Ok(self.profiles.values().find(|p| p.username == username).cloned())
    }

    async fn lookup_by_url(&self, _profile_url: &str) -> Result<Option<CanonicalProfile>, ExternalError> {
        Ok(None)
    }
}

fn three_profile_store() -> ScenarioStore {
    let mut profiles = HashMap::new();
    profiles.insert("a".to_string(), profile("a", "alice", Platform::Instagram));
    profiles.insert("b".to_string(), profile("b", "bob_warning", Platform::Instagram));
    profiles.insert("c".to_string(), profile("c", "carol", Platform::Instagram));

    ScenarioStore {
        // Lower distance = higher similarity; alice ranks above carol above bob.
        dense_profile: vec![
            DenseHit { lance_id: "a".into(), distance: 0.05 },
            DenseHit { lance_id: "c".into(), distance: 0.20 },
            DenseHit { lance_id: "b".into(), distance: 0.80 },
        ],
        dense_posts: vec![
            DenseHit { lance_id: "a".into(), distance: 0.10 },
            DenseHit { lance_id: "c".into(), distance: 0.25 },
            DenseHit { lance_id: "b".into(), distance: 0.75 },
        ],
        lexical: vec![
            LexicalHit { lance_id: "a".into(), raw_score: 9.0 },
            LexicalHit { lance_id: "c".into(), raw_score: 4.0 },
            LexicalHit { lance_id: "b".into(), raw_score: 1.0 },
        ],
        profiles,
    }
}

#[derive(Default)]
struct Collaborators {
    rerank: Option<Arc<dyn RerankTransport>>,
    vendor: Option<Arc<dyn VendorRefreshBackend>>,
    fit: Option<Arc<dyn CompletionClient>>,
}

fn state_with(search: Arc<SearchEngine>, collaborators: Collaborators) -> Arc<AppState> {
    Arc::new(AppState {
        start_time: Instant::now(),
        search,
        jobs: Arc::new(JobRunner::new(JobRunnerConfig::default())),
        rerank: collaborators.rerank,
        vendor: collaborators.vendor,
        fit: collaborators.fit,
        vector_store_configured: true,
    })
}

fn base_state(search: Arc<SearchEngine>) -> Arc<AppState> {
    state_with(search, Collaborators::default())
}

async fn poll_until_terminal(server: &TestServer, job_id: uuid::Uuid) -> serde_json::Value {
    for _ in 0..100 {
        let resp = server.get(&format!("/job/{job_id}")).await;
        let body: serde_json::Value = resp.json();
        let status = body["status"].as_str().unwrap_or_default();
        if status == "finished" || status == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not reach a terminal state in time");
}

/// S1: `POST /search/` with a hybrid query over 3 profiles ranks
/// alice > carol > bob_warning, each with a combined score in [0,1].
#[tokio::test]
async fn s1_plain_search_ranks_and_scores_results() {
    let engine = Arc::new(SearchEngine::new(Arc::new(three_profile_store()), None));
    let state = base_state(engine);
    let server = TestServer::new(build_router(state)).unwrap();

    let enqueue = server
        .post("/search/")
        .json(&json!({"query": "skincare routine", "method": "lexical", "limit": 5}))
        .await;
    enqueue.assert_status_ok();
    let job_id: uuid::Uuid = enqueue.json::<serde_json::Value>()["jobId"].as_str().unwrap().parse().unwrap();

    let record = poll_until_terminal(&server, job_id).await;
    assert_eq!(record["status"], "finished");
    let profiles = record["result"]["profiles"].as_array().unwrap();
    let usernames: Vec<&str> = profiles.iter().map(|p| p["username"].as_str().unwrap()).collect();
    assert_eq!(usernames, vec!["alice", "carol", "bob_warning"]);
    for p in profiles {
        let score = p["scoring"]["combinedScore"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
}

struct StaticRerank(serde_json::Value);

#[async_trait]
impl RerankTransport for StaticRerank {
    async fn rerank_raw(&self, _query: &str, _documents: &[String]) -> Result<serde_json::Value, ExternalError> {
        Ok(self.0.clone())
    }
}

/// S2: reranking reorders the top-k and stamps `rerankScore` on survivors.
#[tokio::test]
async fn s2_rerank_reorders_top_k_and_stamps_scores() {
    // Lexical-only method (no embedder configured): pre-rerank order is
    // alice(0), bob_warning(1), carol(2).
    let store = ScenarioStore {
        dense_profile: vec![],
        dense_posts: vec![],
        lexical: vec![
            LexicalHit { lance_id: "a".into(), raw_score: 9.0 },
            LexicalHit { lance_id: "b".into(), raw_score: 5.0 },
            LexicalHit { lance_id: "c".into(), raw_score: 1.0 },
        ],
        profiles: three_profile_store().profiles,
    };
    let engine = Arc::new(SearchEngine::new(Arc::new(store), None));
    let state = state_with(
        engine,
        Collaborators { rerank: Some(Arc::new(StaticRerank(json!([[2, 0.9], [0, 0.7]])))), ..Default::default() },
    );
    let server = TestServer::new(build_router(state)).unwrap();

    let enqueue = server
        .post("/search/pipeline")
        .json(&json!({
            "search": {"query": "skincare", "method": "lexical", "limit": 5, "filters": {}, "lexicalScope": "bio"},
            "runRerank": true,
            "rerankTopK": 2,
            "rerankMode": "bio+posts",
            "runBrightdata": false,
            "runLlm": false,
            "maxPosts": 10,
            "concurrency": 8
        }))
        .await;
    enqueue.assert_status_ok();
    let job_id: uuid::Uuid = enqueue.json::<serde_json::Value>()["jobId"].as_str().unwrap().parse().unwrap();

    let record = poll_until_terminal(&server, job_id).await;
    let profiles = record["result"]["profiles"].as_array().unwrap();
    let usernames: Vec<&str> = profiles.iter().map(|p| p["username"].as_str().unwrap()).collect();
    assert_eq!(usernames, vec!["carol", "alice", "bob_warning"]);
    assert_eq!(profiles[0]["scoring"]["rerankScore"].as_f64(), Some(0.9));
    assert_eq!(profiles[1]["scoring"]["rerankScore"].as_f64(), Some(0.7));
}

struct StaticVendor;

#[async_trait]
impl VendorRefreshBackend for StaticVendor {
    async fn refresh(
        &self,
        profiles: Vec<CanonicalProfile>,
        progress: &ProgressSink,
    ) -> Result<VendorRefreshOutcome, ExternalError> {
        let mut success_keys = std::collections::HashSet::new();
        for p in &profiles {
            if p.username != "bob_warning" {
                success_keys.insert(p.normalized_key());
            } else {
                progress(scoutline_types::ProgressEvent::new(
                    "BRIGHTDATA_WARNING",
                    json!({"account": p.username, "warning": "private account"}),
                ));
            }
        }
        Ok(VendorRefreshOutcome { enriched: profiles, success_keys, debug: json!({"stub": true}) })
    }
}

struct ScoreByAccount(Mutex<HashMap<String, u8>>);

#[async_trait]
impl CompletionClient for ScoreByAccount {
    async fn complete(&self, prompt: &str, _model: Option<&str>, _verbosity: Option<&str>) -> Result<String, ExternalError> {
        let scores = self.0.lock().unwrap();
        for (account, score) in scores.iter() {
            if prompt.contains(&format!("account: {account}")) {
                return Ok(json!({"score": score, "rationale": "matches brief"}).to_string());
            }
        }
        Ok(json!({"score": 0, "rationale": "no match"}).to_string())
    }
}

/// S3: BrightData filters out the warned profile, then LLM fit-scores the
/// survivors; `BRIGHTDATA_FILTERED` reports the right survivor/dropped counts.
#[tokio::test]
async fn s3_brightdata_filters_then_llm_scores_survivors() {
    let engine = Arc::new(SearchEngine::new(Arc::new(three_profile_store()), None));
    let mut scores = HashMap::new();
    scores.insert("alice".to_string(), 8u8);
    scores.insert("carol".to_string(), 6u8);
    let state = state_with(
        engine,
        Collaborators {
            vendor: Some(Arc::new(StaticVendor)),
            fit: Some(Arc::new(ScoreByAccount(Mutex::new(scores)))),
            ..Default::default()
        },
    );
    let server = TestServer::new(build_router(state)).unwrap();

    let enqueue = server
        .post("/search/pipeline")
        .json(&json!({
            "search": {"query": "skincare", "method": "lexical", "limit": 5, "filters": {}, "lexicalScope": "bio"},
            "runRerank": false,
            "rerankTopK": 20,
            "rerankMode": "bio+posts",
            "runBrightdata": true,
            "runLlm": true,
            "businessFitQuery": "skincare founders",
            "maxPosts": 10,
            "concurrency": 8
        }))
        .await;
    enqueue.assert_status_ok();
    let job_id: uuid::Uuid = enqueue.json::<serde_json::Value>()["jobId"].as_str().unwrap().parse().unwrap();

    let record = poll_until_terminal(&server, job_id).await;
    assert_eq!(record["status"], "finished");
    let profiles = record["result"]["profiles"].as_array().unwrap();
    let usernames: Vec<&str> = profiles.iter().map(|p| p["username"].as_str().unwrap()).collect();
    assert_eq!(usernames.len(), 2);
    assert!(usernames.contains(&"alice"));
    assert!(usernames.contains(&"carol"));
    assert!(!usernames.contains(&"bob_warning"));
    for p in profiles {
        let expected = if p["username"] == "alice" { 8 } else { 6 };
        assert_eq!(p["fitScore"].as_u64(), Some(expected));
    }

    let events: Vec<&str> = record["events"].as_array().unwrap().iter().map(|e| e["stage"].as_str().unwrap()).collect();
    assert!(events.contains(&"BRIGHTDATA_FILTERED"));
    let filtered = record["events"].as_array().unwrap().iter().find(|e| e["stage"] == "BRIGHTDATA_FILTERED").unwrap();
    assert_eq!(filtered["data"]["survivors"].as_u64(), Some(2));
    assert_eq!(filtered["data"]["dropped"].as_u64(), Some(1));
}

/// S6: subscribing to a finished job's SSE stream replays the full
/// historical event prefix, then the stream closes — no duplicate events,
/// no hang waiting for a live event that will never arrive.
#[tokio::test]
async fn s6_late_sse_subscriber_gets_history_then_stream_closes() {
    let engine = Arc::new(SearchEngine::new(Arc::new(three_profile_store()), None));
    let state = base_state(engine);
    let server = TestServer::new(build_router(state)).unwrap();

    let enqueue = server
        .post("/search/")
        .json(&json!({"query": "skincare", "method": "lexical", "limit": 5}))
        .await;
    let job_id: uuid::Uuid = enqueue.json::<serde_json::Value>()["jobId"].as_str().unwrap().parse().unwrap();
    poll_until_terminal(&server, job_id).await;

    let stream_resp = server.get(&format!("/job/{job_id}/stream")).await;
    stream_resp.assert_status_ok();
    let body = stream_resp.text();
    let search_started = body.matches("SEARCH_STARTED").count();
    let search_completed = body.matches("SEARCH_COMPLETED").count();
    assert_eq!(search_started, 1);
    assert_eq!(search_completed, 1);
}
