// crates/search/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("profile not found")]
    ProfileNotFound,

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Backend(#[from] scoutline_core::ExternalError),
}
