//! tally-ingest: statement text extraction, boilerplate filtering and
//! transaction line parsing.

pub mod error;
pub mod extract;
pub mod lines;
pub mod parser;
pub mod types;

pub use error::ConfigError;
pub use extract::{PdfTextExtractor, PlainTextExtractor, TextExtractor};
pub use lines::{DEFAULT_BOILERPLATE, LineClassifier};
pub use parser::{
    Candidates, DateFormat, DecimalConvention, ParseStats, ParserConfig, TransactionParser,
};
pub use types::{
    DirectionSource, ExtractedPage, LineTag, ParseOutcome, ParsedTransaction, PendingCandidate,
    Rejection, StatementLine,
};
