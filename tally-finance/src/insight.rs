//! Insight request payload and the collaborator seam.
//!
//! Building the request is pure assembly. Sending it (timeouts, retries,
//! transport) belongs to whoever implements [`InsightCollaborator`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::{Direction, InsightResult, StatementSummary, Transaction};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightTransaction {
    pub date: NaiveDate,
    pub description: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub direction: Direction,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightCategory {
    pub category: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightSummary {
    #[serde(with = "rust_decimal::serde::str")]
    pub total_income: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_expense: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub net: Decimal,
    pub by_category: Vec<InsightCategory>,
}

/// Structured summary handed to the external insight service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    pub transactions: Vec<InsightTransaction>,
    pub summary: InsightSummary,
}

impl InsightRequest {
    pub fn build(transactions: &[Transaction], summary: &StatementSummary) -> Self {
        Self {
            transactions: transactions
                .iter()
                .map(|t| InsightTransaction {
                    date: t.date,
                    description: t.description.clone(),
                    amount: t.amount,
                    direction: t.direction,
                    category: t.category.clone(),
                })
                .collect(),
            summary: InsightSummary {
                total_income: summary.total_income,
                total_expense: summary.total_expense,
                net: summary.net,
                by_category: summary
                    .by_category
                    .iter()
                    .map(|c| InsightCategory {
                        category: c.category.clone(),
                        total: c.total,
                        count: c.count,
                    })
                    .collect(),
            },
        }
    }
}

/// Why no insight was produced. Never fatal to an upload.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("insight service is not configured: {0}")]
    NotConfigured(String),

    #[error("insight request timed out after {0}s")]
    Timeout(u64),

    #[error("insight service returned an error: {0}")]
    Service(String),

    #[error("insight response could not be understood: {0}")]
    BadResponse(String),
}

/// External service that turns an [`InsightRequest`] into advice.
pub trait InsightCollaborator: Send + Sync {
    fn generate(&self, request: &InsightRequest) -> Result<InsightResult, InsightError>;
}
