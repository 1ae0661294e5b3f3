// crates/ingest/src/batch_client.rs
//! Step 2's external collaborator — the OpenAI Batch API lifecycle
//! (§4.8 step 2). Grounded on `pipeline_batch_process.py`'s
//! `_upload_and_create_batch`/`_wait_for_batch`/`_download_results`, shaped
//! like `scoutline-brightdata::client`'s trigger/poll/download pattern.
//! `BatchApiClient` is a trait so the pipeline can be tested against a stub
//! rather than the live API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scoutline_core::ExternalError;

use crate::error::IngestError;

#[derive(Debug, Clone)]
pub struct BatchApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub model: String,
}

impl Default for BatchApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            poll_interval: Duration::from_secs(30),
            max_attempts: 120,
            model: "gpt-5-nano".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteBatchStatus {
    InProgress(String),
    Completed { output_file_id: String },
    Failed(String),
}

#[async_trait]
pub trait BatchApiClient: Send + Sync {
    async fn upload_file(&self, jsonl_path: &Path) -> Result<String, IngestError>;
    async fn create_batch(&self, input_file_id: &str, chunk_number: u32) -> Result<String, IngestError>;
    async fn get_batch_status(&self, batch_id: &str) -> Result<RemoteBatchStatus, IngestError>;
    async fn download_file(&self, file_id: &str) -> Result<String, IngestError>;
}

pub struct OpenAiBatchClient {
    http: reqwest::Client,
    config: BatchApiConfig,
}

impl OpenAiBatchClient {
    pub fn new(http: reqwest::Client, config: BatchApiConfig) -> Self {
        Self { http, config }
    }
}

#[derive(Deserialize)]
struct FileResponse {
    id: String,
}

#[derive(Serialize)]
struct CreateBatchBody<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'static str,
    metadata: CreateBatchMetadata,
}

#[derive(Serialize)]
struct CreateBatchMetadata {
    description: String,
}

#[derive(Deserialize)]
struct BatchResponse {
    id: String,
    status: String,
    output_file_id: Option<String>,
}

#[async_trait]
impl BatchApiClient for OpenAiBatchClient {
    async fn upload_file(&self, jsonl_path: &Path) -> Result<String, IngestError> {
        let bytes = tokio::fs::read(jsonl_path)
            .await
            .map_err(|source| IngestError::Io { path: jsonl_path.display().to_string(), source })?;
        let file_name = jsonl_path.file_name().and_then(|n| n.to_str()).unwrap_or("batch.jsonl").to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name).mime_str("application/jsonl").map_err(|e| {
            ExternalError::Permanent { service: "openai-files", message: e.to_string() }
        })?;
        let form = reqwest::multipart::Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .http
            .post(format!("{}/files", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let response = check_status(response, "openai-files").await?;
        let parsed: FileResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "openai-files", message: e.to_string() })?;
        Ok(parsed.id)
    }

    async fn create_batch(&self, input_file_id: &str, chunk_number: u32) -> Result<String, IngestError> {
        let body = CreateBatchBody {
            input_file_id,
            endpoint: "/v1/responses",
            completion_window: "24h",
            metadata: CreateBatchMetadata { description: format!("Dataset chunk {chunk_number:03}") },
        };
        let response = self
            .http
            .post(format!("{}/batches", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let response = check_status(response, "openai-batches-create").await?;
        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "openai-batches-create", message: e.to_string() })?;
        Ok(parsed.id)
    }

    async fn get_batch_status(&self, batch_id: &str) -> Result<RemoteBatchStatus, IngestError> {
        let response = self
            .http
            .get(format!("{}/batches/{batch_id}", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let response = check_status(response, "openai-batches-get").await?;
        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "openai-batches-get", message: e.to_string() })?;

        Ok(match parsed.status.as_str() {
            "completed" => RemoteBatchStatus::Completed { output_file_id: parsed.output_file_id.unwrap_or_default() },
            "failed" | "expired" | "cancelled" => RemoteBatchStatus::Failed(parsed.status),
            other => RemoteBatchStatus::InProgress(other.to_string()),
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<String, IngestError> {
        let response = self
            .http
            .get(format!("{}/files/{file_id}/content", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let response = check_status(response, "openai-files-content").await?;
        response
            .text()
            .await
            .map_err(|e| ExternalError::Permanent { service: "openai-files-content", message: e.to_string() }.into())
    }
}

/// Poll `batch_id` every `poll_interval` (floored to 30s, matching the
/// original's `max(poll_interval, 30)`) until it completes or fails, up to
/// `max_attempts` (§4.8 step 2.4).
pub async fn wait_for_batch(client: &dyn BatchApiClient, batch_id: &str, config: &BatchApiConfig) -> Result<String, IngestError> {
    let wait_for = config.poll_interval.max(Duration::from_secs(30));
    for _ in 0..config.max_attempts {
        match client.get_batch_status(batch_id).await? {
            RemoteBatchStatus::Completed { output_file_id } => {
                if output_file_id.is_empty() {
                    return Err(IngestError::MissingOutputFile);
                }
                return Ok(output_file_id);
            }
            RemoteBatchStatus::Failed(status) => {
                return Err(IngestError::BatchFailed { batch_id: batch_id.to_string(), status });
            }
            RemoteBatchStatus::InProgress(_) => {
                tokio::time::sleep(wait_for).await;
            }
        }
    }
    Err(IngestError::PollingExhausted { batch_id: batch_id.to_string() })
}

async fn check_status(response: reqwest::Response, service: &'static str) -> Result<reqwest::Response, IngestError> {
    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(ExternalError::Transient { service, message: format!("status {status}") }.into());
    }
    if !status.is_success() {
        return Err(ExternalError::Permanent { service, message: format!("status {status}") }.into());
    }
    Ok(response)
}

fn classify(e: &reqwest::Error) -> IngestError {
    if e.is_timeout() || e.is_connect() {
        ExternalError::Transient { service: "openai-batch", message: e.to_string() }.into()
    } else {
        ExternalError::Permanent { service: "openai-batch", message: e.to_string() }.into()
    }
}
