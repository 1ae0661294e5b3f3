// crates/brightdata/src/error.rs
use thiserror::Error;

use scoutline_core::ExternalError;

/// Fatal setup errors for the vendor refresh worker (C2, §4.2 "Failure
/// policy"): these abort the whole batch rather than one chunk.
#[derive(Debug, Error)]
pub enum BrightDataError {
    #[error("brightdata is not configured: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Vendor(#[from] ExternalError),
}

impl From<BrightDataError> for ExternalError {
    fn from(err: BrightDataError) -> Self {
        match err {
            BrightDataError::Config(message) => {
                ExternalError::Permanent { service: "brightdata", message }
            }
            BrightDataError::InvalidInput(message) => {
                ExternalError::Permanent { service: "brightdata", message: format!("invalid input: {message}") }
            }
            BrightDataError::Vendor(inner) => inner,
        }
    }
}
