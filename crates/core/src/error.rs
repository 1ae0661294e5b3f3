// crates/core/src/error.rs
use thiserror::Error;

/// Errors raised by the normalizer (C1, §4.1).
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("raw record is not a mapping")]
    InvalidRecord,
}

/// Errors raised by the fit-scoring assessor (C3, §4.3) and the reranker
/// client (C4, §4.4) — both map onto §7's `ExternalTransient`/
/// `ExternalPermanent` taxonomy, with per-item failures captured on the
/// item rather than propagated (so these variants are only ever surfaced
/// at the stage level, never per-profile).
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("transient error calling {service}: {message}")]
    Transient { service: &'static str, message: String },

    #[error("permanent error calling {service}: {message}")]
    Permanent { service: &'static str, message: String },

    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    #[error("rerank response had an unrecognized shape: {0}")]
    UnrecognizedRerankShape(String),
}

impl ExternalError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, ExternalError::Transient { .. })
    }
}

/// Errors raised by the pipeline orchestrator (C6, §4.6).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("business_fit_query is required when run_llm is set")]
    MissingBusinessFitQuery,

    #[error(transparent)]
    Search(#[from] SearchStageError),

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// The SEARCH stage has no useful fallback — a downstream stage has
/// nothing to process (§7 propagation policy).
#[derive(Debug, Error)]
pub enum SearchStageError {
    #[error("search backend error: {0}")]
    Backend(String),
}
