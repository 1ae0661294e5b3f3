// crates/core/src/fit.rs
//! Fit-scoring assessor (C3, §4.3): scores each candidate profile against a
//! business brief via an LLM completion endpoint, bounded concurrency, and
//! per-profile error isolation so one bad call never fails the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use scoutline_types::CanonicalProfile;

use crate::error::ExternalError;

/// Hard cap on `concurrency`, regardless of what the caller requests.
pub const MAX_CONCURRENCY: usize = 64;
/// Retry budget for a single profile's LLM call.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitOptions {
    pub max_posts: usize,
    pub model: Option<String>,
    pub verbosity: Option<String>,
    pub concurrency: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self { max_posts: 10, model: None, verbosity: None, concurrency: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitResult {
    pub account: String,
    pub score: Option<u8>,
    pub rationale: Option<String>,
    pub error: Option<String>,
}

/// The upstream completion endpoint: `prompt -> raw text`. Everything about
/// shaping the request (model, verbosity) lives behind the implementation;
/// the assessor only ever deals in prompts and raw text back.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, model: Option<&str>, verbosity: Option<&str>) -> Result<String, ExternalError>;
}

/// `reqwest`-backed client for an OpenAI-compatible `/completions`-style
/// HTTP endpoint.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpCompletionClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbosity: Option<&'a str>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str, model: Option<&str>, verbosity: Option<&str>) -> Result<String, ExternalError> {
        let body = CompletionRequest { prompt, model, verbosity };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, "fit-llm"))?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ExternalError::Transient { service: "fit-llm", message: format!("status {status}") });
        }
        if !status.is_success() {
            return Err(ExternalError::Permanent { service: "fit-llm", message: format!("status {status}") });
        }
        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "fit-llm", message: e.to_string() })?;
        Ok(parsed.text)
    }
}

fn classify_reqwest_error(e: &reqwest::Error, service: &'static str) -> ExternalError {
    if e.is_timeout() || e.is_connect() {
        ExternalError::Transient { service, message: e.to_string() }
    } else {
        ExternalError::Permanent { service, message: e.to_string() }
    }
}

/// Build the stable prompt for a single profile (§4.3 "Prompt construction").
/// Post captions are listed in the profile's existing (already-ordered)
/// order — never re-sorted here, so the prompt is a pure function of input.
pub fn build_prompt(business_brief: &str, profile: &CanonicalProfile, max_posts: usize) -> String {
    let mut out = String::new();
    out.push_str(business_brief.trim());
    out.push_str("\n\n---\n");
    out.push_str(&format!("account: {}\n", profile.username));
    if let Some(followers) = profile.followers {
        out.push_str(&format!("followers: {followers}\n"));
    }
    if !profile.biography.is_empty() {
        out.push_str(&format!("biography: {}\n", profile.biography));
    }
    out.push_str("recent posts:\n");
    for post in profile.posts.iter().take(max_posts) {
        let mut snippet = post.caption.clone();
        if snippet.chars().count() > 280 {
            snippet = snippet.chars().take(280).collect();
        }
        if !post.hashtags.is_empty() {
            snippet.push_str(&format!(" [{}]", post.hashtags.join(", ")));
        }
        out.push_str(&format!("- {snippet}\n"));
    }
    out
}

#[derive(Deserialize)]
struct RawFitResponse {
    score: Option<serde_json::Value>,
    rationale: Option<String>,
}

fn parse_response(raw: &str) -> (Option<u8>, Option<String>, Option<String>) {
    let parsed: Result<RawFitResponse, _> = serde_json::from_str(raw);
    match parsed {
        Ok(resp) => {
            let score = resp.score.as_ref().and_then(|v| v.as_f64()).map(|f| f.round().clamp(0.0, 10.0) as u8);
            match score {
                Some(s) => (Some(s), resp.rationale, None),
                None => (None, resp.rationale, Some("missing_scores".to_string())),
            }
        }
        Err(_) => (None, None, Some("missing_scores".to_string())),
    }
}

async fn call_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    model: Option<&str>,
    verbosity: Option<&str>,
) -> Result<String, ExternalError> {
    let mut attempt = 0u32;
    loop {
        match client.complete(prompt, model, verbosity).await {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retriable() && attempt < MAX_RETRY_ATTEMPTS => {
                attempt += 1;
                let backoff_ms = 200u64 * 2u64.pow(attempt - 1);
                let jitter_ms: u64 = rand::thread_rng().gen_range(0..100);
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Score every profile against `business_brief`, one `FitResult` per input,
/// in input order, never failing the batch for a per-profile error.
pub async fn score_all(
    client: Arc<dyn CompletionClient>,
    business_brief: &str,
    profiles: &[CanonicalProfile],
    options: &FitOptions,
) -> Vec<FitResult> {
    let concurrency = options.concurrency.clamp(1, MAX_CONCURRENCY);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut set: JoinSet<(usize, FitResult)> = JoinSet::new();

    for (idx, profile) in profiles.iter().enumerate() {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        let prompt = build_prompt(business_brief, profile, options.max_posts);
        let account = profile.username.clone();
        let model = options.model.clone();
        let verbosity = options.verbosity.clone();

        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let result = match call_with_retry(client.as_ref(), &prompt, model.as_deref(), verbosity.as_deref()).await {
                Ok(raw) => {
                    let (score, rationale, error) = parse_response(&raw);
                    FitResult { account, score, rationale, error }
                }
                Err(err) => FitResult { account, score: None, rationale: None, error: Some(err.to_string()) },
            };
            (idx, result)
        });
    }

    let mut ordered: Vec<Option<FitResult>> = (0..profiles.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => ordered[idx] = Some(result),
            Err(join_err) => {
                tracing::warn!(error = %join_err, "fit-scoring task panicked");
            }
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, result)| {
            result.unwrap_or_else(|| FitResult {
                account: profiles[idx].username.clone(),
                score: None,
                rationale: None,
                error: Some("task_panicked".to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient {
        response: String,
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, _prompt: &str, _model: Option<&str>, _verbosity: Option<&str>) -> Result<String, ExternalError> {
            Ok(self.response.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _prompt: &str, _model: Option<&str>, _verbosity: Option<&str>) -> Result<String, ExternalError> {
            Err(ExternalError::Permanent { service: "fit-llm", message: "nope".into() })
        }
    }

    fn profile(username: &str) -> CanonicalProfile {
        CanonicalProfile { username: username.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn scores_every_profile_in_input_order() {
        let client: Arc<dyn CompletionClient> =
            Arc::new(StubClient { response: r#"{"score": 8, "rationale": "good fit"}"#.into() });
        let profiles = vec![profile("a"), profile("b"), profile("c")];
        let results = score_all(client, "brief", &profiles, &FitOptions::default()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().map(|r| r.account.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.score == Some(8)));
    }

    #[tokio::test]
    async fn clamps_out_of_range_score() {
        let client: Arc<dyn CompletionClient> =
            Arc::new(StubClient { response: r#"{"score": 14, "rationale": "x"}"#.into() });
        let profiles = vec![profile("a")];
        let results = score_all(client, "brief", &profiles, &FitOptions::default()).await;
        assert_eq!(results[0].score, Some(10));
    }

    #[tokio::test]
    async fn missing_score_produces_error_not_failure() {
        let client: Arc<dyn CompletionClient> = Arc::new(StubClient { response: "not json".into() });
        let profiles = vec![profile("a")];
        let results = score_all(client, "brief", &profiles, &FitOptions::default()).await;
        assert_eq!(results[0].score, None);
        assert_eq!(results[0].error.as_deref(), Some("missing_scores"));
    }

    #[tokio::test]
    async fn per_profile_failure_does_not_abort_the_batch() {
        let client: Arc<dyn CompletionClient> = Arc::new(FailingClient);
        let profiles = vec![profile("a"), profile("b")];
        let results = score_all(client, "brief", &profiles, &FitOptions::default()).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.error.is_some() && r.score.is_none()));
    }

    #[test]
    fn concurrency_is_hard_capped() {
        let options = FitOptions { concurrency: 1000, ..Default::default() };
        assert_eq!(options.concurrency.clamp(1, MAX_CONCURRENCY), MAX_CONCURRENCY);
    }

    #[test]
    fn prompt_is_stable_for_same_input() {
        let p = profile("stable");
        let a = build_prompt("brief", &p, 10);
        let b = build_prompt("brief", &p, 10);
        assert_eq!(a, b);
    }
}
