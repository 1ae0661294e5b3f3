// crates/search/src/embed.rs
//! The external embedding service (§4.5 "Dense search"): `text -> unit vector`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scoutline_core::ExternalError;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError>;
}

/// `reqwest`-backed client for an OpenAI-compatible embeddings endpoint
/// (grounded on `vector_search.py`'s DeepInfra embedder — same request
/// shape, generalized away from one vendor).
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into(), model: model.into() }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponseItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedResponseItem>,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let body = EmbedRequest { input: text, model: &self.model };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ExternalError::Transient { service: "embeddings", message: format!("status {status}") });
        }
        if !status.is_success() {
            return Err(ExternalError::Permanent { service: "embeddings", message: format!("status {status}") });
        }
        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "embeddings", message: e.to_string() })?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| ExternalError::Permanent { service: "embeddings", message: "empty response".into() })?;
        Ok(normalize(vector))
    }
}

fn classify(e: &reqwest::Error) -> ExternalError {
    if e.is_timeout() || e.is_connect() {
        ExternalError::Transient { service: "embeddings", message: e.to_string() }
    } else {
        ExternalError::Permanent { service: "embeddings", message: e.to_string() }
    }
}

/// L2-normalize to unit length (§4.5: "the returned vector is L2-normalized").
pub fn normalize(v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v;
    }
    v.into_iter().map(|x| (x as f64 / norm) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(vec![3.0, 4.0]);
        let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let v = normalize(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
