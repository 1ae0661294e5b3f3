// crates/search/src/store.rs
//! The external vector-store client (§1 Non-goal: the index itself; this
//! crate only speaks to it). Two logical rows per profile — `profile` and
//! `posts` — each with its own dense vector, plus an index-wide lexical
//! (BM25-like) full-text index (§4.5 "Storage model").

use async_trait::async_trait;

use scoutline_core::ExternalError;
use scoutline_types::{CanonicalProfile, SearchFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Profile,
    Posts,
}

/// One dense-search hit: raw cosine distance, not yet converted to similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHit {
    pub lance_id: String,
    pub distance: f64,
}

/// One lexical-search hit: raw BM25-like score, not yet normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub lance_id: String,
    pub raw_score: f64,
}

#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    async fn dense_search(
        &self,
        facet: Facet,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<DenseHit>, ExternalError>;

    async fn lexical_search(
        &self,
        include_posts: bool,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<LexicalHit>, ExternalError>;

    async fn fetch_profiles(&self, lance_ids: &[String]) -> Result<Vec<CanonicalProfile>, ExternalError>;

    async fn fetch_profile_vector(&self, lance_id: &str) -> Result<Option<Vec<f32>>, ExternalError>;

    async fn lookup_by_username(&self, username: &str) -> Result<Option<CanonicalProfile>, ExternalError>;

    async fn lookup_by_url(&self, profile_url: &str) -> Result<Option<CanonicalProfile>, ExternalError>;
}

/// `d -> max(0, 1 - d)` (§4.5 "Dense search").
pub fn distance_to_similarity(distance: f64) -> f64 {
    (1.0 - distance).max(0.0)
}

/// `reqwest`-backed client for the external vector-and-lexical index (§1
/// Non-goal: the index itself; this crate only speaks to it), following the
/// same thin-HTTP-adapter idiom as `HttpEmbeddingClient`/`HttpRerankTransport`.
pub struct HttpVectorStoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpVectorStoreClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(serde::Serialize)]
struct DenseSearchRequest<'a> {
    facet: &'a str,
    vector: &'a [f32],
    limit: usize,
    filters: &'a SearchFilters,
}

#[derive(serde::Serialize)]
struct LexicalSearchRequest<'a> {
    include_posts: bool,
    query: &'a str,
    limit: usize,
    filters: &'a SearchFilters,
}

#[derive(serde::Serialize)]
struct FetchProfilesRequest<'a> {
    lance_ids: &'a [String],
}

fn classify(e: &reqwest::Error) -> ExternalError {
    if e.is_timeout() || e.is_connect() {
        ExternalError::Transient { service: "vector-store", message: e.to_string() }
    } else {
        ExternalError::Permanent { service: "vector-store", message: e.to_string() }
    }
}

async fn parse_ok<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ExternalError> {
    let status = resp.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(ExternalError::Transient { service: "vector-store", message: format!("status {status}") });
    }
    if !status.is_success() {
        return Err(ExternalError::Permanent { service: "vector-store", message: format!("status {status}") });
    }
    resp.json::<T>().await.map_err(|e| ExternalError::Permanent { service: "vector-store", message: e.to_string() })
}

#[async_trait]
impl VectorStoreClient for HttpVectorStoreClient {
    async fn dense_search(
        &self,
        facet: Facet,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<DenseHit>, ExternalError> {
        let facet_name = match facet {
            Facet::Profile => "profile",
            Facet::Posts => "posts",
        };
        let body = DenseSearchRequest { facet: facet_name, vector, limit, filters };
        let resp = self.http.post(self.url("/dense_search")).json(&body).send().await.map_err(|e| classify(&e))?;
        parse_ok(resp).await
    }

    async fn lexical_search(
        &self,
        include_posts: bool,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<LexicalHit>, ExternalError> {
        let body = LexicalSearchRequest { include_posts, query, limit, filters };
        let resp = self.http.post(self.url("/lexical_search")).json(&body).send().await.map_err(|e| classify(&e))?;
        parse_ok(resp).await
    }

    async fn fetch_profiles(&self, lance_ids: &[String]) -> Result<Vec<CanonicalProfile>, ExternalError> {
        let body = FetchProfilesRequest { lance_ids };
        let resp = self.http.post(self.url("/fetch_profiles")).json(&body).send().await.map_err(|e| classify(&e))?;
        parse_ok(resp).await
    }

    async fn fetch_profile_vector(&self, lance_id: &str) -> Result<Option<Vec<f32>>, ExternalError> {
        let resp = self
            .http
            .get(self.url(&format!("/profile_vector/{}", urlencoding::encode(lance_id))))
            .send()
            .await
            .map_err(|e| classify(&e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_ok(resp).await
    }

    async fn lookup_by_username(&self, username: &str) -> Result<Option<CanonicalProfile>, ExternalError> {
        let resp = self
            .http
            .get(self.url(&format!("/lookup/username/{}", urlencoding::encode(username))))
            .send()
            .await
            .map_err(|e| classify(&e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_ok(resp).await
    }

    async fn lookup_by_url(&self, profile_url: &str) -> Result<Option<CanonicalProfile>, ExternalError> {
        let resp = self
            .http
            .get(self.url(&format!("/lookup/url/{}", urlencoding::encode(profile_url))))
            .send()
            .await
            .map_err(|e| classify(&e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_ok(resp).await
    }
}
