// crates/ingest/src/lib.rs
//! Batch ingestion pipeline (C8, §4.8): resumable language-filter +
//! external-batch-API orchestration over CSV inputs, producing canonical
//! parquet datasets consumed by C5's index build.

pub mod batch_client;
pub mod batch_prepare;
pub mod error;
pub mod language_filter;
pub mod merge;
pub mod pipeline;
pub mod response_parser;
pub mod state;

pub use batch_client::{BatchApiClient, BatchApiConfig, OpenAiBatchClient, RemoteBatchStatus};
pub use batch_prepare::{ChunkInfo, PrepareOptions};
pub use error::IngestError;
pub use language_filter::{HeuristicEnglishDetector, LanguageDetector, LanguageFilterOptions, LanguageFilterOutcome};
pub use pipeline::{combine_and_write, run, write_single, IngestOptions, IngestReport};
