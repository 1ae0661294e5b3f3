// crates/ingest/src/state.rs
//! Crash-safe JSON state persistence (§4.8: every step is "independently
//! resumable via a step marker in state"). Grounded on the original
//! pipeline's `_persist_job_state`/`_save_processed_files`, generalized to a
//! single atomic write-then-rename helper so a crash mid-write never leaves
//! a truncated state file behind.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::IngestError;

pub async fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, IngestError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).or_else(|_| Ok(T::default())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(IngestError::Io { path: path.display().to_string(), source }),
    }
}

/// Write `value` to `path` via a same-directory temp file + rename, so a
/// reader never observes a partially-written file.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IngestError> {
    let body = serde_json::to_vec_pretty(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await.map_err(|source| IngestError::Io { path: dir.display().to_string(), source })?;

    let tmp_path = dir.join(format!(".{}.tmp", path.file_name().and_then(|n| n.to_str()).unwrap_or("state")));
    tokio::fs::write(&tmp_path, &body)
        .await
        .map_err(|source| IngestError::Io { path: tmp_path.display().to_string(), source })?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|source| IngestError::Io { path: path.display().to_string(), source })
}

pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoutline_types::{BatchJobsState, BatchStatus, BatchJobState};

    #[tokio::test]
    async fn round_trips_through_a_temp_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = BatchJobsState::default();
        state.chunks.insert(1, BatchJobState {
            chunk_number: 1,
            batch_id: "batch-1".into(),
            input_file_id: "file-1".into(),
            output_file_id: None,
            profile_count: 10,
            status: BatchStatus::Submitted,
            submitted_at: Some(chrono::Utc::now()),
            completed_at: None,
            prompt_fingerprint: "abc".into(),
            result_path: None,
        });

        save_json(&path, &state).await.unwrap();
        let loaded: BatchJobsState = load_json(&path).await.unwrap();
        assert_eq!(loaded.chunks.get(&1).unwrap().batch_id, "batch-1");
    }

    #[tokio::test]
    async fn missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: BatchJobsState = load_json(&path).await.unwrap();
        assert!(loaded.chunks.is_empty());
    }
}
