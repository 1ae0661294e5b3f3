// crates/core/src/pipeline.rs
//! Pipeline orchestrator (C6, §4.6): wires SEARCH → RERANK → BRIGHTDATA →
//! LLM_FIT, each stage optional except SEARCH, emitting a `ProgressEvent`
//! per transition so a job subscriber can follow along live.
//!
//! The orchestrator depends on the other stages only through traits —
//! concrete implementations (`scoutline-search`, `scoutline-brightdata`)
//! depend on this crate to implement them, not the other way around.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use scoutline_types::{
    CanonicalProfile, PipelineRequest, ProfileRef, ProgressEvent, RerankMode, SearchRequest, StageIo,
};

use crate::error::{ExternalError, PipelineError, SearchStageError};
use crate::fit::{score_all, CompletionClient, FitOptions, FitResult};
use crate::rerank::{rerank, RerankTransport};

/// C5's entry point, as seen by the orchestrator.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CanonicalProfile>, SearchStageError>;
}

/// Outcome of a vendor-refresh pass (C2), as seen by the orchestrator.
pub struct VendorRefreshOutcome {
    pub enriched: Vec<CanonicalProfile>,
    /// Normalized-handle keys BrightData reports as successfully refreshed.
    pub success_keys: HashSet<String>,
    pub debug: serde_json::Value,
}

#[async_trait]
pub trait VendorRefreshBackend: Send + Sync {
    async fn refresh(
        &self,
        profiles: Vec<CanonicalProfile>,
        progress: &ProgressSink,
    ) -> Result<VendorRefreshOutcome, ExternalError>;
}

pub type ProgressSink = dyn Fn(ProgressEvent) + Send + Sync;

#[derive(Default)]
pub struct PipelineDeps {
    pub rerank: Option<Arc<dyn RerankTransport>>,
    pub vendor: Option<Arc<dyn VendorRefreshBackend>>,
    pub fit: Option<Arc<dyn CompletionClient>>,
}

pub struct PipelineOutput {
    pub profiles: Vec<CanonicalProfile>,
    pub brightdata_results: serde_json::Value,
    pub profile_fit: Vec<FitResult>,
}

fn profile_key(p: &CanonicalProfile) -> String {
    p.normalized_key()
}

fn refs(profiles: &[CanonicalProfile]) -> Vec<ProfileRef> {
    profiles.iter().map(CanonicalProfile::to_ref).collect()
}

pub async fn run(
    request: PipelineRequest,
    search_backend: Arc<dyn SearchBackend>,
    deps: PipelineDeps,
    progress: Arc<ProgressSink>,
) -> Result<PipelineOutput, PipelineError> {
    if request.run_llm && request.business_fit_query.is_none() {
        return Err(PipelineError::MissingBusinessFitQuery);
    }

    // --- 1. SEARCH ----------------------------------------------------
    progress(ProgressEvent::new(
        "SEARCH_STARTED",
        json!({ "io": StageIo { inputs: vec![], outputs: vec![], meta: Default::default() } }),
    ));
    let mut profiles = search_backend.search(&request.search).await?;
    if let Some(max) = request.max_profiles {
        profiles.truncate(max);
    }
    progress(ProgressEvent::new(
        "SEARCH_COMPLETED",
        json!({ "io": StageIo { inputs: vec![], outputs: refs(&profiles), meta: Default::default() } }),
    ));

    // --- 2. RERANK ------------------------------------------------------
    if request.run_rerank {
        match &deps.rerank {
            None => {
                progress(ProgressEvent::new("RERANK_SKIPPED", json!({ "reason": "no rerank client configured" })));
            }
            Some(transport) => {
                let before = refs(&profiles);
                progress(ProgressEvent::new("RERANK_STARTED", json!({ "io": StageIo { inputs: before.clone(), outputs: vec![], meta: Default::default() } })));
                let documents: Vec<String> = profiles.iter().map(|p| rerank_document(p, request.rerank_mode)).collect();
                let top_k = request.rerank_top_k.min(profiles.len());
                match rerank(transport.as_ref(), "", &documents, top_k).await {
                    Ok(ranking) => {
                        profiles = apply_ranking(profiles, &ranking);
                        progress(ProgressEvent::new(
                            "RERANK_COMPLETED",
                            json!({ "io": StageIo { inputs: before, outputs: refs(&profiles), meta: Default::default() } }),
                        ));
                    }
                    Err(err) => {
                        progress(ProgressEvent::new("RERANK_FAILED", json!({ "error": err.to_string() })));
                    }
                }
            }
        }
    }

    // --- 3. BRIGHTDATA + post-filter ------------------------------------
    let mut brightdata_debug = serde_json::Value::Null;
    if request.run_brightdata {
        if let Some(vendor) = &deps.vendor {
            let before = refs(&profiles);
            progress(ProgressEvent::new("BRIGHTDATA_STARTED", json!({ "io": StageIo { inputs: before.clone(), outputs: vec![], meta: Default::default() } })));
            let outcome = vendor.refresh(profiles, &*progress).await.map_err(PipelineError::External)?;
            profiles = outcome.enriched;
            brightdata_debug = outcome.debug;
            progress(ProgressEvent::new(
                "BRIGHTDATA_COMPLETED",
                json!({ "io": StageIo { inputs: before, outputs: refs(&profiles), meta: Default::default() } }),
            ));

            let pre_filter_count = profiles.len();
            let survivors: Vec<CanonicalProfile> =
                profiles.into_iter().filter(|p| outcome_contains(&outcome.success_keys, p)).collect();
            let dropped = pre_filter_count - survivors.len();
            progress(ProgressEvent::new(
                "BRIGHTDATA_FILTERED",
                json!({
                    "survivors": survivors.len(),
                    "dropped": dropped,
                    "io": StageIo { inputs: vec![], outputs: refs(&survivors), meta: Default::default() },
                }),
            ));
            profiles = survivors;
        }
    }

    // --- 4. LLM_FIT ------------------------------------------------------
    let mut profile_fit = Vec::new();
    if request.run_llm {
        let brief = request.business_fit_query.clone().ok_or(PipelineError::MissingBusinessFitQuery)?;
        if profiles.is_empty() {
            progress(ProgressEvent::new("LLM_FIT_STARTED", json!({ "io": StageIo { inputs: vec![], outputs: vec![], meta: Default::default() } })));
            progress(ProgressEvent::new("LLM_FIT_COMPLETED", json!({ "scored": 0, "io": StageIo { inputs: vec![], outputs: vec![], meta: Default::default() } })));
        } else if let Some(client) = &deps.fit {
            let before = refs(&profiles);
            progress(ProgressEvent::new("LLM_FIT_STARTED", json!({ "io": StageIo { inputs: before, outputs: vec![], meta: Default::default() } })));
            let options = FitOptions {
                max_posts: request.max_posts,
                model: request.model.clone(),
                verbosity: request.verbosity.clone(),
                concurrency: request.concurrency,
            };
            progress(ProgressEvent::new("LLM_FIT_PROGRESS", json!({ "scored": 0, "total": profiles.len() })));
            let results = score_all(Arc::clone(client), &brief, &profiles, &options).await;
            for (profile, result) in profiles.iter_mut().zip(results.iter()) {
                profile.fit_score = result.score;
                profile.fit_rationale.clone_from(&result.rationale);
                profile.fit_error.clone_from(&result.error);
            }
            progress(ProgressEvent::new(
                "LLM_FIT_COMPLETED",
                json!({ "io": StageIo { inputs: vec![], outputs: refs(&profiles), meta: Default::default() } }),
            ));
            profile_fit = results;
        } else {
            progress(ProgressEvent::new("LLM_FIT_SKIPPED", json!({ "reason": "no fit-scoring client configured" })));
        }
    }

    Ok(PipelineOutput { profiles, brightdata_results: brightdata_debug, profile_fit })
}

fn rerank_document(profile: &CanonicalProfile, mode: RerankMode) -> String {
    let posts: String = profile.posts.iter().map(|p| p.caption.as_str()).collect::<Vec<_>>().join(" ");
    match mode {
        RerankMode::Bio => profile.biography.clone(),
        RerankMode::Posts => posts,
        RerankMode::BioPosts => format!("{} {posts}", profile.biography),
    }
}

fn apply_ranking(profiles: Vec<CanonicalProfile>, ranking: &[(usize, f64)]) -> Vec<CanonicalProfile> {
    let mut slots: Vec<Option<CanonicalProfile>> = profiles.into_iter().map(Some).collect();
    let mut ranked_indices: HashSet<usize> = HashSet::new();
    let mut out = Vec::with_capacity(slots.len());
    for &(idx, score) in ranking {
        if let Some(mut p) = slots.get_mut(idx).and_then(Option::take) {
            p.scoring.rerank_score = Some(score);
            out.push(p);
            ranked_indices.insert(idx);
        }
    }
    for (idx, slot) in slots.into_iter().enumerate() {
        if !ranked_indices.contains(&idx) {
            if let Some(p) = slot {
                out.push(p);
            }
        }
    }
    out
}

fn outcome_contains(success_keys: &HashSet<String>, profile: &CanonicalProfile) -> bool {
    success_keys.contains(&profile_key(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoutline_types::{SearchFilters, SearchMethod};
    use std::sync::Mutex;

    struct StaticSearch(Vec<CanonicalProfile>);

    #[async_trait]
    impl SearchBackend for StaticSearch {
        async fn search(&self, _request: &SearchRequest) -> Result<Vec<CanonicalProfile>, SearchStageError> {
            Ok(self.0.clone())
        }
    }

    fn profile(username: &str) -> CanonicalProfile {
        CanonicalProfile { username: username.into(), platform: Some(scoutline_types::Platform::Instagram), ..Default::default() }
    }

    fn base_request(profiles_limit: Option<usize>) -> PipelineRequest {
        PipelineRequest {
            search: SearchRequest {
                query: "skincare".into(),
                method: SearchMethod::Hybrid,
                limit: 20,
                filters: SearchFilters::default(),
                lexical_scope: scoutline_types::LexicalScope::Bio,
            },
            run_rerank: false,
            rerank_top_k: 20,
            rerank_mode: RerankMode::BioPosts,
            run_brightdata: false,
            run_llm: false,
            business_fit_query: None,
            max_posts: 10,
            model: None,
            verbosity: None,
            concurrency: 8,
            max_profiles: profiles_limit,
        }
    }

    #[tokio::test]
    async fn search_only_clips_to_max_profiles() {
        let backend = Arc::new(StaticSearch(vec![profile("a"), profile("b"), profile("c")]));
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let progress: Arc<ProgressSink> = Arc::new(move |e| events_clone.lock().unwrap().push(e.stage));

        let output = run(base_request(Some(2)), backend, PipelineDeps::default(), progress).await.unwrap();
        assert_eq!(output.profiles.len(), 2);
        assert!(events.lock().unwrap().contains(&"SEARCH_COMPLETED".to_string()));
    }

    #[tokio::test]
    async fn llm_fit_requires_business_fit_query() {
        let backend = Arc::new(StaticSearch(vec![profile("a")]));
        let mut req = base_request(None);
        req.run_llm = true;
        let progress: Arc<ProgressSink> = Arc::new(|_| {});
        let err = run(req, backend, PipelineDeps::default(), progress).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingBusinessFitQuery));
    }

    #[tokio::test]
    async fn rerank_requested_without_client_emits_skip_and_preserves_order() {
        let backend = Arc::new(StaticSearch(vec![profile("a"), profile("b")]));
        let mut req = base_request(None);
        req.run_rerank = true;
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let progress: Arc<ProgressSink> = Arc::new(move |e| events_clone.lock().unwrap().push(e.stage));

        let output = run(req, backend, PipelineDeps::default(), progress).await.unwrap();
        assert_eq!(output.profiles[0].username, "a");
        assert!(events.lock().unwrap().contains(&"RERANK_SKIPPED".to_string()));
    }

    #[tokio::test]
    async fn llm_fit_on_empty_profiles_emits_started_and_completed_pair() {
        let backend = Arc::new(StaticSearch(vec![]));
        let mut req = base_request(None);
        req.run_llm = true;
        req.business_fit_query = Some("skincare founders".into());
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let progress: Arc<ProgressSink> = Arc::new(move |e| events_clone.lock().unwrap().push(e.stage));

        let output = run(req, backend, PipelineDeps::default(), progress).await.unwrap();
        assert!(output.profile_fit.is_empty());
        let seen = events.lock().unwrap().clone();
        assert!(seen.contains(&"LLM_FIT_STARTED".to_string()));
        assert!(seen.contains(&"LLM_FIT_COMPLETED".to_string()));
    }

    #[tokio::test]
    async fn llm_fit_requested_without_client_emits_skip() {
        let backend = Arc::new(StaticSearch(vec![profile("a")]));
        let mut req = base_request(None);
        req.run_llm = true;
        req.business_fit_query = Some("skincare founders".into());
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let progress: Arc<ProgressSink> = Arc::new(move |e| events_clone.lock().unwrap().push(e.stage));

        let output = run(req, backend, PipelineDeps::default(), progress).await.unwrap();
        assert!(output.profile_fit.is_empty());
        assert!(events.lock().unwrap().contains(&"LLM_FIT_SKIPPED".to_string()));
    }
}
