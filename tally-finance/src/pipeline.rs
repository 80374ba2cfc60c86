//! Pipeline orchestrator: drives one Upload from bytes to a terminal status.
//!
//! extract -> classify -> parse -> categorize -> aggregate, strictly in order.
//! Every stage runs under `catch_unwind`; a panic fails the upload with
//! `InternalParseError` instead of unwinding into the caller. The cancel flag
//! is checked between stages.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tally_core::{
    CancelFlag, FailureReason, StatementSummary, Transaction, TransitionError, Upload, UploadEvent,
    UploadStatus,
};
use tally_ingest::{LineClassifier, PdfTextExtractor, TextExtractor, TransactionParser};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{summarize, verify_sum_invariant};
use crate::category_rules::Categorizer;
use crate::insight::{InsightCollaborator, InsightRequest};

/// Compiled rule tables shared read-only by every concurrent pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    classifier: LineClassifier,
    parser: TransactionParser,
    categorizer: Categorizer,
}

impl PipelineConfig {
    pub fn new(classifier: LineClassifier, parser: TransactionParser, categorizer: Categorizer) -> Self {
        Self {
            classifier,
            parser,
            categorizer,
        }
    }

    pub fn classifier(&self) -> &LineClassifier {
        &self.classifier
    }

    pub fn parser(&self) -> &TransactionParser {
        &self.parser
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }
}

/// Notified after every accepted status transition, e.g. to persist it.
pub trait UploadObserver: Send + Sync {
    fn on_transition(&self, upload: &Upload);
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    extractor: Arc<dyn TextExtractor>,
    observer: Option<Arc<dyn UploadObserver>>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one stage, converting a panic into `InternalParseError`.
fn guarded<T>(stage: &'static str, f: impl FnOnce() -> Result<T, FailureReason>) -> Result<T, FailureReason> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!(stage, panic = %msg, "pipeline stage panicked");
            Err(FailureReason::InternalParseError(format!("{stage} stage: {msg}")))
        }
    }
}

fn checkpoint(cancel: &CancelFlag, next_stage: &'static str) -> Result<(), FailureReason> {
    if cancel.is_cancelled() {
        info!(next_stage, "pipeline cancelled");
        return Err(FailureReason::Cancelled);
    }
    Ok(())
}

impl Pipeline {
    /// Pipeline reading PDF documents.
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            config,
            extractor: Arc::new(PdfTextExtractor),
            observer: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn transition(&self, upload: &mut Upload, event: UploadEvent) -> Result<UploadStatus, TransitionError> {
        let status = upload.apply(event)?;
        if let Some(observer) = &self.observer {
            observer.on_transition(upload);
        }
        Ok(status)
    }

    /// Process `bytes` for a `Pending` upload and leave it `Completed` or
    /// `Failed`. Only a lifecycle misuse (e.g. an upload that already ran)
    /// is returned as an error.
    pub fn process(
        &self,
        upload: &mut Upload,
        bytes: &[u8],
        insight: Option<&dyn InsightCollaborator>,
        cancel: &CancelFlag,
    ) -> Result<UploadStatus, TransitionError> {
        if cancel.is_cancelled() {
            return self.transition(upload, UploadEvent::Fail(FailureReason::Cancelled));
        }
        self.transition(upload, UploadEvent::Start)?;

        let (transactions, summary) = match self.run_stages(upload.id, bytes, cancel) {
            Ok(out) => out,
            Err(reason) => return self.transition(upload, UploadEvent::Fail(reason)),
        };

        if let Err(reason) = checkpoint(cancel, "insight") {
            return self.transition(upload, UploadEvent::Fail(reason));
        }

        let insight_result = insight.and_then(|collab| {
            let request = InsightRequest::build(&transactions, &summary);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| collab.generate(&request)));
            match outcome {
                Ok(Ok(result)) => Some(result),
                Ok(Err(e)) => {
                    warn!(upload = %upload.id, error = %e, "insight unavailable; completing without it");
                    None
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    warn!(upload = %upload.id, panic = %msg, "insight collaborator panicked; completing without it");
                    None
                }
            }
        });

        upload.transactions = transactions;
        upload.summary = Some(summary);
        upload.insight = insight_result;
        self.transition(upload, UploadEvent::Complete)
    }

    fn run_stages(
        &self,
        upload_id: Uuid,
        bytes: &[u8],
        cancel: &CancelFlag,
    ) -> Result<(Vec<Transaction>, StatementSummary), FailureReason> {
        let cfg = &self.config;

        checkpoint(cancel, "extract")?;
        let pages = guarded("extract", || self.extractor.extract(bytes).map_err(FailureReason::from))?;

        checkpoint(cancel, "classify")?;
        let lines = guarded("classify", || Ok(cfg.classifier.classify(&pages)))?;

        checkpoint(cancel, "parse")?;
        let parsed = guarded("parse", || {
            let mut candidates = cfg.parser.parse(&lines);
            let parsed: Vec<_> = candidates.by_ref().collect();
            let stats = candidates.stats();
            info!(
                %upload_id,
                lines = lines.len(),
                candidates = parsed.len(),
                continuations = stats.continuations,
                "parsed statement"
            );
            if parsed.is_empty() {
                return Err(FailureReason::NoTransactionsFound);
            }
            Ok(parsed)
        })?;

        checkpoint(cancel, "categorize")?;
        let transactions = guarded("categorize", || {
            Ok(parsed
                .into_iter()
                .map(|p| {
                    let txn = Transaction::new(
                        upload_id,
                        p.date,
                        p.description,
                        p.amount,
                        p.direction,
                        p.confidence,
                        p.raw_line,
                    );
                    cfg.categorizer.apply(txn)
                })
                .collect::<Vec<_>>())
        })?;

        checkpoint(cancel, "aggregate")?;
        let summary = guarded("aggregate", || {
            let summary = summarize(&transactions);
            verify_sum_invariant(&transactions, &summary)
                .map_err(|e| FailureReason::InternalParseError(e.to_string()))?;
            Ok(summary)
        })?;

        debug!(
            %upload_id,
            categories = summary.by_category.len(),
            net = %summary.net,
            "aggregated statement"
        );
        Ok((transactions, summary))
    }
}
