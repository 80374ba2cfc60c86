//! Transaction record types produced by the parser + categorizer stages

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category assigned before the categorizer has run.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Money out (debit) or money in (credit)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    #[serde(rename = "debit")]
    Debit,
    #[serde(rename = "credit")]
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }

    /// Apply this direction to an unsigned magnitude: debits are negative.
    pub fn sign(&self, magnitude: Decimal) -> Decimal {
        match self {
            Direction::Debit => -magnitude.abs(),
            Direction::Credit => magnitude.abs(),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed statement line item, owned by exactly one upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Owning upload
    pub upload_id: Uuid,
    pub date: NaiveDate,
    /// Description text as it appeared between date and amount
    pub description: String,
    /// Signed amount: debits negative, credits non-negative
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub direction: Direction,
    pub category: String,
    /// Parser confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Source line(s) the record was parsed from, kept for diagnostics
    pub raw_line: String,
}

impl Transaction {
    pub fn new(
        upload_id: Uuid,
        date: NaiveDate,
        description: impl Into<String>,
        amount: Decimal,
        direction: Direction,
        confidence: f64,
        raw_line: impl Into<String>,
    ) -> Self {
        Self {
            upload_id,
            date,
            description: description.into(),
            amount,
            direction,
            category: UNCATEGORIZED.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            raw_line: raw_line.into(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}
