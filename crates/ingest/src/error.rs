// crates/ingest/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("input csv has no header row")]
    MissingHeader,

    #[error("language_batch_size must be greater than 0")]
    InvalidBatchSize,

    #[error("no rows passed the language filter")]
    LanguageFilterEmptyResult,

    #[error(transparent)]
    BatchApi(#[from] scoutline_core::ExternalError),

    #[error("batch {batch_id} ended with status {status}")]
    BatchFailed { batch_id: String, status: String },

    #[error("maximum polling attempts exceeded for batch {batch_id}")]
    PollingExhausted { batch_id: String },

    #[error("batch completed without an output file id")]
    MissingOutputFile,

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("expected an 'instagram' directory and a 'tiktok/tiktok.csv' file under {0}")]
    MissingPlatformDataset(String),
}
