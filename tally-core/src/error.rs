use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::upload::UploadStatus;

/// Why the text extractor could not produce text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExtractionFailure {
    #[error("the document could not be read: {0}")]
    Unreadable(String),

    #[error("the document contains no extractable text (scanned, image-only statements are not supported)")]
    NoText,
}

/// Terminal reason recorded on a failed upload.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("extraction failed: {0}")]
    ExtractionFailed(ExtractionFailure),

    #[error("no transactions were found; the document may not be a supported bank statement")]
    NoTransactionsFound,

    #[error("internal error while processing the statement: {0}")]
    InternalParseError(String),

    #[error("processing was cancelled")]
    Cancelled,
}

impl FailureReason {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::ExtractionFailed(ExtractionFailure::Unreadable(_)) => "extraction_failed",
            FailureReason::ExtractionFailed(ExtractionFailure::NoText) => "no_text",
            FailureReason::NoTransactionsFound => "no_transactions_found",
            FailureReason::InternalParseError(_) => "internal_parse_error",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl From<ExtractionFailure> for FailureReason {
    fn from(e: ExtractionFailure) -> Self {
        FailureReason::ExtractionFailed(e)
    }
}

/// Input rejected before the pipeline runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file is empty")]
    Empty,

    #[error("file size {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported file type '{0}' (expected .pdf)")]
    UnsupportedType(String),
}

/// A status move the lifecycle does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid upload transition from {from:?} on {event}")]
pub struct TransitionError {
    pub from: UploadStatus,
    pub event: &'static str,
}
