// crates/types/src/batch.rs
//! Ingestion (C8) persisted-state wire types (§3 `BatchJobState`, §6
//! "Persisted state (ingestion)").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Created,
    Submitted,
    Completed,
    Failed,
}

/// One chunk's state in the batch-submit/collect step (§4.8 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchJobState {
    pub chunk_number: u32,
    #[serde(default)]
    pub batch_id: String,
    #[serde(default)]
    pub input_file_id: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    pub profile_count: usize,
    pub status: BatchStatus,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub prompt_fingerprint: String,
    pub result_path: Option<String>,
}

/// `{namespace}_batch_jobs_state.json` — mapping `chunk_number -> state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchJobsState {
    #[serde(flatten)]
    pub chunks: BTreeMap<u32, BatchJobState>,
}

/// One entry in `{namespace}_processed_files.json`, keyed by source-CSV path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessedFileEntry {
    pub hash: String,
    pub prompt_fingerprint: String,
    pub stage: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedFiles {
    #[serde(flatten)]
    pub entries: BTreeMap<String, ProcessedFileEntry>,
}

/// `metadata.json` under the language-filter directory — the cache key for
/// Step 0 (§4.8 step 0, §8 S5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LanguageFilterMetadata {
    pub hash_of_input: String,
    pub version: String,
    pub batch_size: usize,
    pub english_rows: usize,
    pub excluded_rows: usize,
}

/// Per-chunk sidecar metadata written alongside each batch-prepare file
/// (§4.8 step 1: "Persist `row_count`, `source_hash`, and the prompt
/// fingerprint alongside each chunk").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChunkMetadata {
    pub chunk_number: u32,
    pub row_count: usize,
    pub source_hash: String,
    pub prompt_fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_jobs_state_serializes_flattened_by_chunk_number() {
        let mut state = BatchJobsState::default();
        state.chunks.insert(
            1,
            BatchJobState {
                chunk_number: 1,
                batch_id: "batch-1".into(),
                input_file_id: "file-1".into(),
                output_file_id: None,
                profile_count: 100,
                status: BatchStatus::Submitted,
                submitted_at: Some(chrono::Utc::now()),
                completed_at: None,
                prompt_fingerprint: "abc".into(),
                result_path: None,
            },
        );
        let v = serde_json::to_value(&state).unwrap();
        assert!(v.get("1").is_some());
    }
}
