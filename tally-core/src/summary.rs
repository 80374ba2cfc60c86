//! Derived aggregates and the externally produced insight result.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-category rollup for one upload. Always recomputed from transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    /// Signed sum of every transaction in the category
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    pub count: usize,
    /// Signed sum of the debit side (zero or negative)
    #[serde(with = "rust_decimal::serde::str")]
    pub debit_total: Decimal,
    /// Sum of the credit side (zero or positive)
    #[serde(with = "rust_decimal::serde::str")]
    pub credit_total: Decimal,
    /// Share of overall expense magnitude, in percent (2 dp)
    #[serde(with = "rust_decimal::serde::str")]
    pub share_of_expenses: Decimal,
}

/// Overall income / expense picture of one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    #[serde(with = "rust_decimal::serde::str")]
    pub total_income: Decimal,
    /// Magnitude of all debits (non-negative)
    #[serde(with = "rust_decimal::serde::str")]
    pub total_expense: Decimal,
    /// total_income - total_expense
    #[serde(with = "rust_decimal::serde::str")]
    pub net: Decimal,
    pub transaction_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub by_category: Vec<CategorySummary>,
}

impl StatementSummary {
    pub fn category(&self, name: &str) -> Option<&CategorySummary> {
        self.by_category.iter().find(|c| c.category == name)
    }
}

/// Advisory text returned by the insight collaborator. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    pub text: String,
    pub generated_at: DateTime<Utc>,
    /// Identifier of the model that produced the text
    pub model: String,
    #[serde(default)]
    pub risk_flags: Vec<String>,
}
