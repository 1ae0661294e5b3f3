// crates/types/src/request.rs
//! Request DTOs for the §6 HTTP API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Lexical,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LexicalScope {
    Bio,
    BioPosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
    Bio,
    Posts,
    #[serde(rename = "bio+posts")]
    BioPosts,
}

/// Numeric range filter: either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default)]
    pub follower_range: Range,
    #[serde(default)]
    pub engagement_range: Range,
    #[serde(default)]
    pub location_substring: Option<String>,
    #[serde(default)]
    pub category_substring: Option<String>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub is_business_account: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_method")]
    pub method: SearchMethod,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default = "default_lexical_scope")]
    pub lexical_scope: LexicalScope,
}

fn default_method() -> SearchMethod {
    SearchMethod::Hybrid
}

fn default_limit() -> usize {
    20
}

fn default_lexical_scope() -> LexicalScope {
    LexicalScope::Bio
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimilarRequest {
    pub account: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    pub category: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub search: SearchRequest,

    #[serde(default)]
    pub run_rerank: bool,
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
    #[serde(default = "default_rerank_mode")]
    pub rerank_mode: RerankMode,

    #[serde(default)]
    pub run_brightdata: bool,

    #[serde(default)]
    pub run_llm: bool,
    #[serde(default)]
    pub business_fit_query: Option<String>,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub max_profiles: Option<usize>,
}

fn default_rerank_top_k() -> usize {
    20
}
fn default_rerank_mode() -> RerankMode {
    RerankMode::BioPosts
}
fn default_max_posts() -> usize {
    10
}
fn default_concurrency() -> usize {
    8
}

/// Body for the profiles-only vendor-refresh job (`/search/pipeline/brightdata`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrightdataOnlyRequest {
    pub profiles: Vec<crate::ProfileRef>,
}

/// Body for the profiles-only fit-scoring job (`/search/pipeline/llm`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmOnlyRequest {
    pub profiles: Vec<crate::CanonicalProfile>,
    pub business_fit_query: String,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_applies_defaults() {
        let req: SearchRequest = serde_json::from_value(serde_json::json!({"query": "skincare"})).unwrap();
        assert_eq!(req.method, SearchMethod::Hybrid);
        assert_eq!(req.limit, 20);
        assert_eq!(req.lexical_scope, LexicalScope::Bio);
    }

    #[test]
    fn rerank_mode_serializes_with_plus() {
        let v = serde_json::to_value(RerankMode::BioPosts).unwrap();
        assert_eq!(v, serde_json::json!("bio+posts"));
    }
}
