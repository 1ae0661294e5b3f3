// crates/ingest/src/pipeline.rs
//! Orchestrates the three resumable steps of §4.8 end to end, mirroring
//! `pipeline_batch_process.py`'s `SequentialBatchPipeline.run`: language
//! filter → batch prepare → batch submit/collect → merge. Each step
//! persists its own state so a crash (or an explicit `force`) only redoes
//! the affected step.
//!
//! Departure from the original: its CLI submits one batch then exits,
//! relying on a human to re-invoke the process to resume polling (a batch
//! can take up to 24h). This crate runs ingestion as a long-lived async
//! task rather than a short CLI invocation, so `run` submits every
//! not-yet-submitted chunk and polls each to completion within the one
//! call; `BatchJobsState` is still persisted after every transition, so a
//! process restart mid-poll resumes exactly where the original would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use scoutline_types::{BatchJobState, BatchJobsState, BatchStatus, CanonicalProfile, Platform};

use crate::batch_client::{self, BatchApiClient, BatchApiConfig};
use crate::batch_prepare::{self, ChunkInfo, PrepareOptions};
use crate::error::IngestError;
use crate::language_filter::{self, LanguageDetector, LanguageFilterOptions};
use crate::merge;
use crate::response_parser::{self, ParsedLabelRow};
use crate::state;

pub const COMBINED_SUBDIR: &str = "combined";
pub const COMBINED_FILENAME: &str = "social_profiles.csv";

pub struct IngestOptions {
    pub namespace: String,
    pub language_filter: LanguageFilterOptions,
    pub prepare: PrepareOptions,
    pub batch: BatchApiConfig,
    pub force: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            namespace: "ds".to_string(),
            language_filter: LanguageFilterOptions::default(),
            prepare: PrepareOptions::default(),
            batch: BatchApiConfig::default(),
            force: false,
        }
    }
}

pub struct IngestReport {
    pub english_rows: usize,
    pub excluded_rows: usize,
    pub chunk_count: usize,
    pub profiles: Vec<CanonicalProfile>,
}

/// Runs steps 0–2 and the label-join half of Merge for a single dataset
/// (one platform, one input CSV); returns the joined, unwritten profiles so
/// a caller ingesting two platforms can combine them before writing parquet
/// (see `combine_and_write`).
pub async fn run(
    csv_path: &Path,
    prompt_template: &str,
    output_dir: &Path,
    platform_hint: Option<Platform>,
    client: &dyn BatchApiClient,
    detector: &dyn LanguageDetector,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    let hash_of_input = hash_file(csv_path).await?;
    let prompt_fingerprint = hash_bytes(prompt_template.as_bytes());

    let lf_dir = output_dir.join("language_filter");
    let lf_outcome = language_filter::run(csv_path, &lf_dir, &hash_of_input, &options.language_filter, detector).await?;

    let batches_dir = output_dir.join("batches");
    let chunks = batch_prepare::prepare_batches(
        &lf_outcome.english_path,
        &batches_dir,
        &options.namespace,
        prompt_template,
        &prompt_fingerprint,
        &hash_of_input,
        &options.prepare,
    )
    .await?;

    let labels = submit_and_collect(&batches_dir, &options.namespace, &chunks, client, &options.batch).await?;

    let filtered_rows = read_rows(&lf_outcome.english_path).await?;
    let profiles = merge::merge_rows_with_labels(filtered_rows, labels, platform_hint);

    Ok(IngestReport { english_rows: lf_outcome.english_rows, excluded_rows: lf_outcome.excluded_rows, chunk_count: chunks.len(), profiles })
}

/// Step 2 (§4.8): for each chunk, skip if already completed with a result
/// file on disk; resume polling if already submitted; otherwise upload,
/// create the batch, and persist `submitted` before polling. State is
/// saved after every transition so a crash leaves a resumable marker.
async fn submit_and_collect(
    batches_dir: &Path,
    namespace: &str,
    chunks: &[ChunkInfo],
    client: &dyn BatchApiClient,
    batch_config: &BatchApiConfig,
) -> Result<Vec<ParsedLabelRow>, IngestError> {
    let state_path = batches_dir.join(format!("{namespace}_batch_jobs_state.json"));
    let mut jobs_state: BatchJobsState = state::load_json(&state_path).await?;
    let mut all_labels = Vec::new();

    for chunk in chunks {
        let result_path = batches_dir.join(format!("{namespace}_batch_{:03}_result.csv", chunk.index));

        let entry = jobs_state.chunks.entry(chunk.index).or_insert_with(|| BatchJobState {
            chunk_number: chunk.index,
            batch_id: String::new(),
            input_file_id: String::new(),
            output_file_id: None,
            profile_count: chunk.row_count,
            status: BatchStatus::Created,
            submitted_at: None,
            completed_at: None,
            prompt_fingerprint: String::new(),
            result_path: None,
        });

        if entry.status == BatchStatus::Completed && state::file_exists(&result_path).await {
            all_labels.extend(read_label_csv(&result_path).await?);
            continue;
        }

        if entry.status != BatchStatus::Submitted {
            let input_file_id = client.upload_file(&chunk.jsonl_path).await?;
            let batch_id = client.create_batch(&input_file_id, chunk.index).await?;
            entry.input_file_id = input_file_id;
            entry.batch_id = batch_id;
            entry.status = BatchStatus::Submitted;
            entry.submitted_at = Some(chrono::Utc::now());
            state::save_json(&state_path, &jobs_state).await?;
        }

        let batch_id = jobs_state.chunks.get(&chunk.index).unwrap().batch_id.clone();
        let outcome = batch_client::wait_for_batch(client, &batch_id, batch_config).await;

        let entry = jobs_state.chunks.get_mut(&chunk.index).unwrap();
        match outcome {
            Ok(output_file_id) => {
                let jsonl = client.download_file(&output_file_id).await?;
                let labels = response_parser::parse_output_jsonl(&jsonl, chunk.index);
                write_label_csv(&result_path, &labels).await?;

                entry.output_file_id = Some(output_file_id);
                entry.status = BatchStatus::Completed;
                entry.completed_at = Some(chrono::Utc::now());
                entry.result_path = Some(result_path.display().to_string());
                state::save_json(&state_path, &jobs_state).await?;

                all_labels.extend(labels);
            }
            Err(err) => {
                entry.status = BatchStatus::Failed;
                state::save_json(&state_path, &jobs_state).await?;
                return Err(err);
            }
        }
    }

    Ok(all_labels)
}

/// Combines two single-platform reports (§4.8 "Merge": "when both
/// platforms are present, combine and reassign lance_ids") and writes one
/// canonical parquet file.
pub fn combine_and_write(
    by_platform: Vec<(Platform, IngestReport)>,
    output_path: &Path,
) -> Result<usize, IngestError> {
    let combined = merge::combine_platforms(by_platform.into_iter().map(|(p, r)| (p, r.profiles)).collect());
    let count = combined.len();
    merge::write_canonical_parquet(&combined, output_path)?;
    Ok(count)
}

pub fn write_single(report: &IngestReport, output_path: &Path) -> Result<(), IngestError> {
    merge::write_canonical_parquet(&report.profiles, output_path)
}

async fn hash_file(path: &Path) -> Result<String, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| IngestError::Io { path: path.display().to_string(), source })?;
    Ok(hash_bytes(&bytes))
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

async fn read_rows(path: &Path) -> Result<Vec<HashMap<String, String>>, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| IngestError::Io { path: path.display().to_string(), source })?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(headers.iter().zip(record.iter()).map(|(h, v)| (h.to_string(), v.to_string())).collect());
    }
    Ok(rows)
}

const LABEL_CSV_HEADERS: &[&str] = &[
    "lance_id",
    "individual_vs_org",
    "generational_appeal",
    "professionalization",
    "relationship_status",
    "location",
    "ethnicity",
    "age",
    "occupation",
    "keyword1",
    "keyword2",
    "keyword3",
    "keyword4",
    "keyword5",
    "keyword6",
    "keyword7",
    "keyword8",
    "keyword9",
    "keyword10",
    "raw_response",
    "processing_error",
    "source_batch",
];

async fn write_label_csv(path: &Path, rows: &[ParsedLabelRow]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|source| IngestError::Io { path: parent.display().to_string(), source })?;
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(LABEL_CSV_HEADERS)?;
    for row in rows {
        let mut keywords = row.labels.keywords.iter().map(String::as_str).collect::<Vec<_>>();
        keywords.resize(10, "");
        let mut record = vec![
            row.lance_id.clone(),
            row.labels.individual_vs_org.map(|v| v.to_string()).unwrap_or_default(),
            row.labels.generational_appeal.map(|v| v.to_string()).unwrap_or_default(),
            row.labels.professionalization.map(|v| v.to_string()).unwrap_or_default(),
            row.labels.relationship_status.map(|v| v.to_string()).unwrap_or_default(),
            row.labels.location.clone(),
            row.labels.ethnicity.clone(),
            row.labels.age.clone(),
            row.labels.occupation.clone(),
        ];
        record.extend(keywords.into_iter().map(str::to_string));
        record.push(row.raw_response.clone());
        record.push(row.processing_error.clone());
        record.push(row.source_batch.clone());
        writer.write_record(&record)?;
    }
    let body = writer.into_inner().expect("in-memory csv writer never fails to flush");
    tokio::fs::write(path, body).await.map_err(|source| IngestError::Io { path: path.display().to_string(), source })
}

async fn read_label_csv(path: &Path) -> Result<Vec<ParsedLabelRow>, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| IngestError::Io { path: path.display().to_string(), source })?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let keywords = (9..19).map(|i| record[i].to_string()).collect::<Vec<_>>();
        let parse_score = |s: &str| -> Option<u8> { if s.is_empty() { None } else { s.parse().ok() } };
        rows.push(ParsedLabelRow {
            lance_id: record[0].to_string(),
            labels: scoutline_types::LlmLabels {
                individual_vs_org: parse_score(&record[1]),
                generational_appeal: parse_score(&record[2]),
                professionalization: parse_score(&record[3]),
                relationship_status: parse_score(&record[4]),
                location: record[5].to_string(),
                ethnicity: record[6].to_string(),
                age: record[7].to_string(),
                occupation: record[8].to_string(),
                keywords,
            },
            raw_response: record[19].to_string(),
            processing_error: record[20].to_string(),
            source_batch: record[21].to_string(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language_filter::HeuristicEnglishDetector;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubClient {
        output_jsonl: String,
        polls: Mutex<u32>,
    }

    #[async_trait]
    impl BatchApiClient for StubClient {
        async fn upload_file(&self, _jsonl_path: &Path) -> Result<String, IngestError> {
            Ok("file-1".to_string())
        }
        async fn create_batch(&self, _input_file_id: &str, _chunk_number: u32) -> Result<String, IngestError> {
            Ok("batch-1".to_string())
        }
        async fn get_batch_status(&self, _batch_id: &str) -> Result<batch_client::RemoteBatchStatus, IngestError> {
            *self.polls.lock().unwrap() += 1;
            Ok(batch_client::RemoteBatchStatus::Completed { output_file_id: "out-1".to_string() })
        }
        async fn download_file(&self, _file_id: &str) -> Result<String, IngestError> {
            Ok(self.output_jsonl.clone())
        }
    }

    #[tokio::test]
    async fn end_to_end_run_produces_labeled_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("in.csv");
        tokio::fs::write(
            &csv_path,
            "lance_db_id,account,biography,posts,username,profile_url\nns_000001,alice,hello there this is a long english biography,,alice,https://instagram.com/alice\n",
        )
        .await
        .unwrap();

        let response = serde_json::json!({
            "custom_id": "profile-ns_000001",
            "response": {
                "status_code": 200,
                "body": {"output": [{"type": "message", "content": [{"type": "output_text", "text": "5,5,5,5,Paris,French,25,Artist,k1,k2,k3,k4,k5,k6,k7,k8,k9,k10"}]}]}
            }
        });
        let client = StubClient { output_jsonl: response.to_string(), polls: Mutex::new(0) };

        let options = IngestOptions {
            namespace: "ns".to_string(),
            prepare: PrepareOptions { chunk_size: 10, ..Default::default() },
            batch: BatchApiConfig { poll_interval: std::time::Duration::from_millis(1), ..Default::default() },
            ..Default::default()
        };

        let report = run(
            &csv_path,
            "Account: {account}",
            &dir.path().join("out"),
            Some(Platform::Instagram),
            &client,
            &HeuristicEnglishDetector,
            &options,
        )
        .await
        .unwrap();

        assert_eq!(report.profiles.len(), 1);
        assert_eq!(report.profiles[0].llm_labels.as_ref().unwrap().occupation, "Artist");
    }

    #[tokio::test]
    async fn resumes_from_completed_state_without_recontacting_client() {
        let dir = tempfile::tempdir().unwrap();
        let batches_dir = dir.path().join("batches");
        tokio::fs::create_dir_all(&batches_dir).await.unwrap();

        let result_path = batches_dir.join("ns_batch_001_result.csv");
        let labels = vec![ParsedLabelRow {
            lance_id: "ns_000001".to_string(),
            labels: scoutline_types::LlmLabels::default(),
            raw_response: String::new(),
            processing_error: String::new(),
            source_batch: "batch_001".to_string(),
        }];
        write_label_csv(&result_path, &labels).await.unwrap();

        let mut jobs_state = BatchJobsState::default();
        jobs_state.chunks.insert(1, BatchJobState {
            chunk_number: 1,
            batch_id: "batch-1".into(),
            input_file_id: "file-1".into(),
            output_file_id: Some("out-1".into()),
            profile_count: 1,
            status: BatchStatus::Completed,
            submitted_at: Some(chrono::Utc::now()),
            completed_at: Some(chrono::Utc::now()),
            prompt_fingerprint: "fp".into(),
            result_path: Some(result_path.display().to_string()),
        });
        state::save_json(&batches_dir.join("ns_batch_jobs_state.json"), &jobs_state).await.unwrap();

        let jsonl_path = batches_dir.join("ns_batch_001.jsonl");
        tokio::fs::write(&jsonl_path, "").await.unwrap();
        let chunks = vec![ChunkInfo { index: 1, jsonl_path, row_count: 1 }];

        let client = StubClient { output_jsonl: String::new(), polls: Mutex::new(0) };
        let batch_config = BatchApiConfig::default();
        let labels = submit_and_collect(&batches_dir, "ns", &chunks, &client, &batch_config).await.unwrap();

        assert_eq!(labels.len(), 1);
        assert_eq!(*client.polls.lock().unwrap(), 0);
    }
}
