use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::Direction;

/// Text of one logical page, as produced by a [`crate::TextExtractor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// 1-based page number
    pub number: usize,
    pub text: String,
}

/// Whether the line classifier kept a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineTag {
    Retained,
    /// Discarded by the boilerplate rule at this index, or a blank line when `None`
    Discarded { rule: Option<usize> },
}

/// One physical line of statement text, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    /// 0-based position across the whole document
    pub index: usize,
    pub page: usize,
    /// Trimmed line text
    pub text: String,
    pub tag: LineTag,
}

impl StatementLine {
    pub fn is_retained(&self) -> bool {
        self.tag == LineTag::Retained
    }
}

/// How the direction of a candidate was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionSource {
    /// Minus sign, parentheses or a CR/DR marker on the amount
    Sign,
    /// A configured debit/credit keyword in the description
    Keyword,
    /// Nothing decided it; fell back to credit
    Default,
}

/// Parser output: a transaction candidate that passed every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Signed: debits negative
    pub amount: Decimal,
    pub direction: Direction,
    pub direction_source: DirectionSource,
    /// Running balance, when the statement prints one
    pub balance: Option<Decimal>,
    pub confidence: f64,
    /// Index of the line carrying the date
    pub line_index: usize,
    /// Number of continuation lines consumed (0 when single-line)
    pub continuation_lines: usize,
    /// Source text, continuation lines joined with " | "
    pub raw_line: String,
}

/// A dated line still waiting for its amount on a following line.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCandidate {
    pub date: NaiveDate,
    pub description: String,
    pub line_index: usize,
    pub raw_lines: Vec<String>,
}

/// Why a line produced no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// No date recognizer matched; ordinary non-transaction text
    NoDate,
    /// Dated line with no amount on it or the lookahead lines
    NoAmount,
    /// Amount token too large for a fixed-point decimal
    AmountOutOfRange,
}

/// Result of feeding one line to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ParsedTransaction),
    ContinuationPending(PendingCandidate),
    Rejected(Rejection),
}
