// crates/types/src/job.rs
//! Job runtime & event bus wire types (§3, §4.7).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Terminal-or-not lifecycle of a `JobRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// Compact profile refs a stage consumed/produced, so a subscriber can
/// reconstruct which profiles entered and left a stage without the full
/// records (§4.6 "Stage IO envelope").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageIo {
    #[serde(default)]
    pub inputs: Vec<crate::ProfileRef>,
    #[serde(default)]
    pub outputs: Vec<crate::ProfileRef>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// One entry in a `JobRecord`'s append-only event log (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Canonical uppercase stage name, e.g. `SEARCH_STARTED`, `BRIGHTDATA_FILTERED`.
    pub stage: String,
    pub data: serde_json::Value,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            stage: stage.into(),
            data,
        }
    }
}

/// The full state of one background job (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: uuid::Uuid,
    pub queue: String,
    pub status: JobStatus,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bounded, most-recent-N (recommended 100, see §4.7 TTL/cap).
    pub events: Vec<ProgressEvent>,
}

impl JobRecord {
    pub fn new(job_id: uuid::Uuid, queue: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_id,
            queue: queue.into(),
            status: JobStatus::Queued,
            enqueued_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
            payload,
            result: None,
            error: None,
            events: Vec::new(),
        }
    }
}

/// Response envelope for every enqueue endpoint (§6).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub job_id: uuid::Uuid,
    pub queue: String,
    pub status: JobStatus,
}
