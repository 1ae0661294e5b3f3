// crates/core/src/rerank.rs
//! Reranker client (C4, §4.4): scores a query against a document list via an
//! upstream reranking endpoint, tolerating several response shapes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ExternalError;

/// The upstream reranking endpoint. Implementations only need to produce
/// the raw JSON body — shape normalization happens in [`rerank`].
#[async_trait]
pub trait RerankTransport: Send + Sync {
    async fn rerank_raw(&self, query: &str, documents: &[String]) -> Result<Value, ExternalError>;
}

pub struct HttpRerankTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpRerankTransport {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }
}

#[derive(serde::Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[async_trait]
impl RerankTransport for HttpRerankTransport {
    async fn rerank_raw(&self, query: &str, documents: &[String]) -> Result<Value, ExternalError> {
        let body = RerankRequest { query, documents };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ExternalError::Transient { service: "reranker", message: format!("status {status}") });
        }
        if !status.is_success() {
            return Err(ExternalError::Permanent { service: "reranker", message: format!("status {status}") });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ExternalError::Permanent { service: "reranker", message: e.to_string() })
    }
}

fn classify(e: &reqwest::Error) -> ExternalError {
    if e.is_timeout() || e.is_connect() {
        ExternalError::Transient { service: "reranker", message: e.to_string() }
    } else {
        ExternalError::Permanent { service: "reranker", message: e.to_string() }
    }
}

#[derive(Deserialize)]
struct IndexScore {
    index: usize,
    score: f64,
}

/// Call the transport, normalize the response into `(index, score)` pairs
/// sorted descending by score, length ≤ `top_k`.
pub async fn rerank(
    transport: &dyn RerankTransport,
    query: &str,
    documents: &[String],
    top_k: usize,
) -> Result<Vec<(usize, f64)>, ExternalError> {
    let raw = transport.rerank_raw(query, documents).await?;
    let mut pairs = normalize_shape(&raw, documents.len())?;
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pairs.truncate(top_k);
    Ok(pairs)
}

/// Accepts (§4.4 "Acceptable upstream shapes"):
/// - `[{"index": i, "score": s}, ...]`
/// - `[[i, s], ...]`
/// - `[s0, s1, ...]` aligned to input order
fn normalize_shape(raw: &Value, doc_count: usize) -> Result<Vec<(usize, f64)>, ExternalError> {
    let array = raw
        .as_array()
        .or_else(|| raw.get("results").and_then(Value::as_array))
        .or_else(|| raw.get("scores").and_then(Value::as_array))
        .ok_or_else(|| unrecognized(raw))?;

    if array.is_empty() {
        return Ok(Vec::new());
    }

    if array.iter().all(|v| v.is_object()) {
        let mut out = Vec::with_capacity(array.len());
        for v in array {
            let entry: IndexScore = serde_json::from_value(v.clone()).map_err(|_| unrecognized(raw))?;
            if entry.index >= doc_count {
                return Err(unrecognized(raw));
            }
            out.push((entry.index, entry.score));
        }
        return Ok(out);
    }

    if array.iter().all(|v| v.is_array()) {
        let mut out = Vec::with_capacity(array.len());
        for v in array {
            let pair = v.as_array().unwrap();
            if pair.len() != 2 {
                return Err(unrecognized(raw));
            }
            let index = pair[0].as_u64().ok_or_else(|| unrecognized(raw))? as usize;
            let score = pair[1].as_f64().ok_or_else(|| unrecognized(raw))?;
            if index >= doc_count {
                return Err(unrecognized(raw));
            }
            out.push((index, score));
        }
        return Ok(out);
    }

    if array.iter().all(|v| v.is_number()) {
        if array.len() != doc_count {
            return Err(unrecognized(raw));
        }
        return Ok(array.iter().enumerate().map(|(i, v)| (i, v.as_f64().unwrap_or(0.0))).collect());
    }

    Err(unrecognized(raw))
}

fn unrecognized(raw: &Value) -> ExternalError {
    ExternalError::UnrecognizedRerankShape(raw.to_string())
}
