//! tally-finance: category rules, aggregation, the insight payload and the
//! pipeline that drives an upload through every stage.

pub mod aggregator;
pub mod category_rules;
pub mod insight;
pub mod pipeline;
pub mod rules_csv;
pub mod settings;

pub use aggregator::{SumMismatch, summarize, verify_sum_invariant};
pub use category_rules::{CategoryRule, Categorizer, FALLBACK_CATEGORY, MatchKind, default_rules};
pub use insight::{InsightCollaborator, InsightError, InsightRequest};
pub use pipeline::{Pipeline, PipelineConfig, UploadObserver};
pub use rules_csv::{RuleFileError, load_rules_csv, parse_rules_csv};
pub use settings::{CategorySettings, ClassifierSettings, PipelineSettings, SettingsError};
