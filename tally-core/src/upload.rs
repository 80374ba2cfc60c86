//! Upload lifecycle: one ingestion job from submission to a terminal state.
//!
//! Status only moves forward:
//!
//! ```text
//! Pending --Start--> Processing --Complete--> Completed
//!    |                   |
//!    +------Fail---------+-----Fail---------> Failed
//! ```
//!
//! [`UploadStatus::next`] is the single transition function; [`Upload::apply`]
//! is the only place that writes `Upload::status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FailureReason, TransitionError, ValidationError};
use crate::summary::{InsightResult, StatementSummary};
use crate::transaction::Transaction;

/// Largest accepted document (10 MB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Start,
    Complete,
    Fail(FailureReason),
}

impl UploadEvent {
    fn name(&self) -> &'static str {
        match self {
            UploadEvent::Start => "start",
            UploadEvent::Complete => "complete",
            UploadEvent::Fail(_) => "fail",
        }
    }
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    /// The lifecycle transition table.
    pub fn next(self, event: &UploadEvent) -> Result<UploadStatus, TransitionError> {
        match (self, event) {
            (UploadStatus::Pending, UploadEvent::Start) => Ok(UploadStatus::Processing),
            (UploadStatus::Processing, UploadEvent::Complete) => Ok(UploadStatus::Completed),
            (UploadStatus::Pending | UploadStatus::Processing, UploadEvent::Fail(_)) => {
                Ok(UploadStatus::Failed)
            }
            (from, ev) => Err(TransitionError {
                from,
                event: ev.name(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the uploaded bytes came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_name: String,
    pub size_bytes: usize,
    /// Hex SHA-256 of the document bytes
    pub sha256: String,
}

impl SourceRef {
    pub fn from_bytes(file_name: impl Into<String>, bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self {
            file_name: file_name.into(),
            size_bytes: bytes.len(),
            sha256: format!("{:x}", digest),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: Uuid,
    pub source: SourceRef,
    status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    failure: Option<FailureReason>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub summary: Option<StatementSummary>,
    pub insight: Option<InsightResult>,
}

impl Upload {
    pub fn new(source: SourceRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
            failure: None,
            transactions: Vec::new(),
            summary: None,
            insight: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Terminal failure reason, set only when status is `Failed`.
    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    /// Apply a lifecycle event. Rejected events leave the upload untouched.
    pub fn apply(&mut self, event: UploadEvent) -> Result<UploadStatus, TransitionError> {
        let next = match self.status.next(&event) {
            Ok(next) => next,
            Err(e) => {
                warn!(upload = %self.id, error = %e, "rejected upload transition");
                return Err(e);
            }
        };

        if let UploadEvent::Fail(reason) = event {
            info!(upload = %self.id, reason = reason.code(), "upload failed: {}", reason);
            self.failure = Some(reason);
        } else {
            info!(upload = %self.id, from = %self.status, to = %next, "upload transition");
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// Status query view: status plus failure reason when failed.
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            id: self.id,
            status: self.status,
            failure: self.failure.clone(),
            message: self.failure.as_ref().map(|f| f.to_string()),
        }
    }
}

/// What a status query returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: Uuid,
    pub status: UploadStatus,
    pub failure: Option<FailureReason>,
    /// Plain-language failure message
    pub message: Option<String>,
}

/// Size/type checks done by the surrounding system before the pipeline runs.
pub fn validate_upload(file_name: &str, bytes: &[u8]) -> Result<(), ValidationError> {
    validate_upload_with(file_name, bytes, &["pdf"])
}

/// Like [`validate_upload`] with a caller-chosen extension allow-list.
pub fn validate_upload_with(
    file_name: &str,
    bytes: &[u8],
    extensions: &[&str],
) -> Result<(), ValidationError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)) {
        return Err(ValidationError::UnsupportedType(ext));
    }
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            size: bytes.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Shared flag the surrounding system trips to abandon an in-flight upload.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionFailure;

    fn upload() -> Upload {
        Upload::new(SourceRef::from_bytes("statement.pdf", b"%PDF-1.4"))
    }

    #[test]
    fn test_happy_path() {
        let mut u = upload();
        assert_eq!(u.status(), UploadStatus::Pending);
        assert_eq!(u.apply(UploadEvent::Start).unwrap(), UploadStatus::Processing);
        assert_eq!(u.apply(UploadEvent::Complete).unwrap(), UploadStatus::Completed);
        assert!(u.failure().is_none());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut u = upload();
        u.apply(UploadEvent::Start).unwrap();
        u.apply(UploadEvent::Fail(FailureReason::NoTransactionsFound))
            .unwrap();
        assert_eq!(u.status(), UploadStatus::Failed);
        assert_eq!(u.failure(), Some(&FailureReason::NoTransactionsFound));
        let report = u.status_report();
        assert_eq!(report.status, UploadStatus::Failed);
        assert!(report.message.unwrap().contains("no transactions"));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut done = upload();
        done.apply(UploadEvent::Start).unwrap();
        done.apply(UploadEvent::Complete).unwrap();
        assert!(done.apply(UploadEvent::Start).is_err());
        assert!(done.apply(UploadEvent::Fail(FailureReason::Cancelled)).is_err());
        assert_eq!(done.status(), UploadStatus::Completed);

        let mut failed = upload();
        failed
            .apply(UploadEvent::Fail(FailureReason::Cancelled))
            .unwrap();
        assert!(failed.apply(UploadEvent::Start).is_err());
        assert!(failed.apply(UploadEvent::Complete).is_err());
        assert_eq!(failed.failure(), Some(&FailureReason::Cancelled));
    }

    #[test]
    fn test_cannot_complete_without_processing() {
        let mut u = upload();
        let err = u.apply(UploadEvent::Complete).unwrap_err();
        assert_eq!(err.from, UploadStatus::Pending);
        assert_eq!(u.status(), UploadStatus::Pending);
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("a.pdf", b"%PDF-1.7").is_ok());
        assert!(validate_upload("A.PDF", b"%PDF-1.7").is_ok());
        assert_eq!(
            validate_upload("a.docx", b"x"),
            Err(ValidationError::UnsupportedType("docx".into()))
        );
        assert_eq!(validate_upload("a.pdf", b""), Err(ValidationError::Empty));
        let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
        assert!(matches!(
            validate_upload("a.pdf", &big),
            Err(ValidationError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_failure_serialization() {
        let reason = FailureReason::ExtractionFailed(ExtractionFailure::NoText);
        let v = serde_json::to_value(&reason).unwrap();
        assert_eq!(v["kind"], "extraction_failed");
        assert_eq!(reason.code(), "no_text");

        let status = serde_json::to_value(UploadStatus::Processing).unwrap();
        assert_eq!(status, "PROCESSING");
    }

    #[test]
    fn test_source_ref_hash_is_stable() {
        let a = SourceRef::from_bytes("x.pdf", b"abc");
        let b = SourceRef::from_bytes("y.pdf", b"abc");
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.sha256.len(), 64);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
