//! Reasons a single marker occurrence is rejected.
//!
//! These never escape [`crate::parse_all_markers`]: the scanner logs them and
//! drops the occurrence. They are public so the `decode_*` functions can be
//! used directly when diagnosing why a marker was not recognized.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("unbalanced JSON payload at offset {position}")]
    Unbalanced { position: usize },

    #[error("marker tag at offset {position} never closes")]
    UnclosedTag { position: usize },

    #[error("no JSON payload follows the tag at offset {position}")]
    MissingPayload { position: usize },

    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("unexpected payload shape: expected {expected}")]
    InvalidShape { expected: &'static str },
}

pub type Result<T> = std::result::Result<T, MarkerError>;
