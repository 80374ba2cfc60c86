//! tally-core: data model, failure taxonomy and the upload lifecycle shared by
//! the ingestion and finance crates.

pub mod error;
pub mod summary;
pub mod transaction;
pub mod upload;

pub use error::{ExtractionFailure, FailureReason, TransitionError, ValidationError};
pub use summary::{CategorySummary, InsightResult, StatementSummary};
pub use transaction::{Direction, Transaction, UNCATEGORIZED};
pub use upload::{
    CancelFlag, MAX_UPLOAD_BYTES, SourceRef, StatusReport, Upload, UploadEvent, UploadStatus,
    validate_upload, validate_upload_with,
};
