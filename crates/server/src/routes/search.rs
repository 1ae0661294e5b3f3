// crates/server/src/routes/search.rs
//! `POST /search/*` and `GET /search/username/{u}` (§6). Every stage
//! combination enqueues through C7 and returns an `EnqueueResponse`;
//! `/search/username/{u}` is the one synchronous lookup in the table.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use scoutline_core::pipeline::{run as run_pipeline, SearchBackend, VendorRefreshBackend};
use scoutline_core::{score_all, FitResult};
use scoutline_types::{
    BrightdataOnlyRequest, CanonicalProfile, CategoryRequest, EnqueueResponse, LlmOnlyRequest, PipelineRequest,
    ProgressEvent, RerankMode, SearchRequest, SimilarRequest,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResultPayload {
    profiles: Vec<CanonicalProfile>,
    brightdata_results: serde_json::Value,
    profile_fit: Vec<FitResult>,
}

fn bare_pipeline_request(search: SearchRequest) -> PipelineRequest {
    PipelineRequest {
        search,
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
        max_profiles: None,
    }
}

fn enqueue_pipeline(state: &AppState, queue: &str, request: PipelineRequest) -> EnqueueResponse {
    let payload = serde_json::to_value(&request).unwrap_or_default();
    let backend: Arc<dyn SearchBackend> = state.search_backend();
    let deps = state.pipeline_deps();
    state.jobs.enqueue(queue, payload, move |sink| async move {
        run_pipeline(request, backend, deps, sink)
            .await
            .map(|output| {
                serde_json::to_value(PipelineResultPayload {
                    profiles: output.profiles,
                    brightdata_results: output.brightdata_results,
                    profile_fit: output.profile_fit,
                })
                .unwrap_or_default()
            })
            .map_err(|e| e.to_string())
    })
}

/// `POST /search/` — plain search, no rerank/vendor/LLM stages.
#[utoipa::path(post, path = "/search/", request_body = SearchRequest, responses((status = 200, body = EnqueueResponse)))]
pub async fn search(State(state): State<Arc<AppState>>, Json(body): Json<SearchRequest>) -> Json<EnqueueResponse> {
    Json(enqueue_pipeline(&state, "search", bare_pipeline_request(body)))
}

/// `POST /search/category` — folds `category` into `filters.category_substring`.
#[utoipa::path(post, path = "/search/category", request_body = CategoryRequest, responses((status = 200, body = EnqueueResponse)))]
pub async fn category(State(state): State<Arc<AppState>>, Json(body): Json<CategoryRequest>) -> Json<EnqueueResponse> {
    let mut filters = body.filters;
    filters.category_substring = Some(body.category.clone());
    let search_request = SearchRequest {
        query: body.category,
        method: scoutline_types::SearchMethod::Hybrid,
        limit: body.limit,
        filters,
        lexical_scope: scoutline_types::LexicalScope::Bio,
    };
    Json(enqueue_pipeline(&state, "search", bare_pipeline_request(search_request)))
}

/// `POST /search/similar` — C5's similar-creator lookup, run as a job since
/// it still makes several external calls (anchor lookup, two dense
/// searches, fetch).
#[utoipa::path(post, path = "/search/similar", request_body = SimilarRequest, responses((status = 200, body = EnqueueResponse)))]
pub async fn similar(State(state): State<Arc<AppState>>, Json(body): Json<SimilarRequest>) -> Json<EnqueueResponse> {
    let payload = serde_json::to_value(&body).unwrap_or_default();
    let engine = Arc::clone(&state.search);
    let response = state.jobs.enqueue("search", payload, move |sink| async move {
        sink(ProgressEvent::new("SEARCH_STARTED", serde_json::json!({ "account": &body.account })));
        let result = engine
            .find_similar(&body.account, body.limit)
            .await
            .map(|profiles| {
                serde_json::to_value(PipelineResultPayload {
                    profiles,
                    brightdata_results: serde_json::Value::Null,
                    profile_fit: Vec::new(),
                })
                .unwrap_or_default()
            })
            .map_err(|e| e.to_string());
        if result.is_ok() {
            sink(ProgressEvent::new("SEARCH_COMPLETED", serde_json::json!({})));
        }
        result
    });
    Json(response)
}

/// `POST /search/pipeline` — full, caller-configured multi-stage run.
#[utoipa::path(post, path = "/search/pipeline", request_body = PipelineRequest, responses((status = 200, body = EnqueueResponse)))]
pub async fn pipeline(State(state): State<Arc<AppState>>, Json(body): Json<PipelineRequest>) -> Json<EnqueueResponse> {
    Json(enqueue_pipeline(&state, "pipeline", body))
}

/// `POST /search/pipeline/brightdata` — vendor-refresh-only job. Profile
/// refs are resolved to full profiles by account before refreshing; refs
/// that carry only a `profileUrl` (no account) can't be resolved through
/// the lookup C5 exposes today and are dropped, each logged once.
#[utoipa::path(post, path = "/search/pipeline/brightdata", request_body = BrightdataOnlyRequest, responses((status = 200, body = EnqueueResponse)))]
pub async fn pipeline_brightdata(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BrightdataOnlyRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    let vendor = state.vendor.clone().ok_or_else(|| ApiError::ConfigError("no vendor client configured".into()))?;
    let payload = serde_json::to_value(&body).unwrap_or_default();
    let engine = Arc::clone(&state.search);

    let response = state.jobs.enqueue("pipeline", payload, move |sink| async move {
        let mut profiles = Vec::new();
        for profile_ref in &body.profiles {
            match &profile_ref.account {
                Some(account) => match engine.by_username(account).await {
                    Ok(profile) => profiles.push(profile),
                    Err(err) => {
                        sink(ProgressEvent::new(
                            "BRIGHTDATA_PROFILE_FAILED",
                            serde_json::json!({ "account": account, "error": err.to_string() }),
                        ));
                    }
                },
                None => {
                    sink(ProgressEvent::new(
                        "BRIGHTDATA_PROFILE_SKIPPED",
                        serde_json::json!({ "reason": "profileRef has no account to resolve" }),
                    ));
                }
            }
        }

        sink(ProgressEvent::new("BRIGHTDATA_STARTED", serde_json::json!({ "count": profiles.len() })));
        let outcome = vendor.refresh(profiles, &*sink).await.map_err(|e| e.to_string())?;
        sink(ProgressEvent::new("BRIGHTDATA_COMPLETED", serde_json::json!({ "count": outcome.enriched.len() })));
        Ok(serde_json::to_value(PipelineResultPayload {
            profiles: outcome.enriched,
            brightdata_results: outcome.debug,
            profile_fit: Vec::new(),
        })
        .unwrap_or_default())
    });
    Ok(Json(response))
}

/// `POST /search/pipeline/llm` — fit-scoring-only job over caller-supplied profiles.
#[utoipa::path(post, path = "/search/pipeline/llm", request_body = LlmOnlyRequest, responses((status = 200, body = EnqueueResponse)))]
pub async fn pipeline_llm(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LlmOnlyRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    let fit = state.fit.clone().ok_or_else(|| ApiError::ConfigError("no fit-scoring client configured".into()))?;
    let payload = serde_json::to_value(&body).unwrap_or_default();

    let response = state.jobs.enqueue("pipeline", payload, move |sink| async move {
        let options = scoutline_core::FitOptions {
            max_posts: body.max_posts,
            model: body.model,
            verbosity: body.verbosity,
            concurrency: body.concurrency,
        };
        sink(ProgressEvent::new(
            "LLM_FIT_STARTED",
            serde_json::json!({ "count": body.profiles.len() }),
        ));
        let results = score_all(fit, &body.business_fit_query, &body.profiles, &options).await;
        let mut profiles = body.profiles;
        for (profile, result) in profiles.iter_mut().zip(results.iter()) {
            profile.fit_score = result.score;
            profile.fit_rationale.clone_from(&result.rationale);
            profile.fit_error.clone_from(&result.error);
        }
        sink(ProgressEvent::new("LLM_FIT_COMPLETED", serde_json::json!({ "scored": results.len() })));
        Ok(serde_json::to_value(PipelineResultPayload {
            profiles,
            brightdata_results: serde_json::Value::Null,
            profile_fit: results,
        })
        .unwrap_or_default())
    });
    Ok(Json(response))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsernameResponse {
    success: bool,
    result: CanonicalProfile,
}

/// `GET /search/username/{u}` — the one synchronous lookup in the table.
#[utoipa::path(get, path = "/search/username/{u}", responses((status = 200, body = UsernameResponse), (status = 404)))]
pub async fn by_username(State(state): State<Arc<AppState>>, Path(u): Path<String>) -> ApiResult<Json<UsernameResponse>> {
    let result = state.search.by_username(&u).await.map_err(ApiError::from)?;
    Ok(Json(UsernameResponse { success: true, result }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search/", post(search))
        .route("/search/category", post(category))
        .route("/search/similar", post(similar))
        .route("/search/pipeline", post(pipeline))
        .route("/search/pipeline/brightdata", post(pipeline_brightdata))
        .route("/search/pipeline/llm", post(pipeline_llm))
        .route("/search/username/{u}", get(by_username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use scoutline_jobs::{JobRunner, JobRunnerConfig};
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            start_time: std::time::Instant::now(),
            search: crate::test_support::empty_search_engine(),
            jobs: Arc::new(JobRunner::new(JobRunnerConfig::default())),
            rerank: None,
            vendor: None,
            fit: None,
            vector_store_configured: false,
        })
    }

    #[tokio::test]
    async fn search_enqueues_and_returns_job_id() {
        let app = router().with_state(state());
        let body = serde_json::json!({"query": "skincare"});
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/search/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn by_username_unknown_account_is_404() {
        let app = router().with_state(state());
        let resp = app
            .oneshot(Request::builder().uri("/search/username/nobody").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn brightdata_only_without_vendor_configured_is_503() {
        let app = router().with_state(state());
        let body = serde_json::json!({"profiles": []});
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/search/pipeline/brightdata")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
