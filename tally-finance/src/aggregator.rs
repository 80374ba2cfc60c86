//! Aggregator: categorized transactions -> per-category rollups and an overall
//! income/expense summary. Pure and re-derivable; nothing here is stored as a
//! source of truth.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tally_core::{CategorySummary, Direction, StatementSummary, Transaction};
use thiserror::Error;

/// A summary that no longer agrees with its transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SumMismatch {
    #[error("category totals sum to {categories}, transactions sum to {transactions}")]
    Total {
        categories: Decimal,
        transactions: Decimal,
    },

    #[error("{direction} side: category totals sum to {categories}, transactions sum to {transactions}")]
    Direction {
        direction: Direction,
        categories: Decimal,
        transactions: Decimal,
    },

    #[error("net {net} differs from the signed transaction sum {transactions}")]
    Net { net: Decimal, transactions: Decimal },
}

#[derive(Default)]
struct Bucket {
    count: usize,
    debit: Decimal,
    credit: Decimal,
}

/// Roll transactions up by category. Rows come out ordered by category name.
pub fn summarize(txns: &[Transaction]) -> StatementSummary {
    let mut buckets: BTreeMap<&str, Bucket> = BTreeMap::new();
    let mut income = Decimal::ZERO;
    let mut debits = Decimal::ZERO;

    for t in txns {
        let b = buckets.entry(t.category.as_str()).or_default();
        b.count += 1;
        match t.direction {
            Direction::Debit => {
                b.debit += t.amount;
                debits += t.amount;
            }
            Direction::Credit => {
                b.credit += t.amount;
                income += t.amount;
            }
        }
    }

    let expense = debits.abs();
    let hundred = Decimal::ONE_HUNDRED;

    let by_category = buckets
        .into_iter()
        .map(|(category, b)| {
            let share = if expense.is_zero() {
                Decimal::ZERO
            } else {
                (b.debit.abs() * hundred / expense).round_dp(2)
            };
            CategorySummary {
                category: category.to_string(),
                total: b.debit + b.credit,
                count: b.count,
                debit_total: b.debit,
                credit_total: b.credit,
                share_of_expenses: share,
            }
        })
        .collect();

    StatementSummary {
        total_income: income,
        total_expense: expense,
        net: income - expense,
        transaction_count: txns.len(),
        first_date: txns.iter().map(|t| t.date).min(),
        last_date: txns.iter().map(|t| t.date).max(),
        by_category,
    }
}

/// Exact decimal check that category rows partition the transaction sums,
/// overall and per direction.
pub fn verify_sum_invariant(txns: &[Transaction], summary: &StatementSummary) -> Result<(), SumMismatch> {
    let signed: Decimal = txns.iter().map(|t| t.amount).sum();
    let categories: Decimal = summary.by_category.iter().map(|c| c.total).sum();
    if categories != signed {
        return Err(SumMismatch::Total {
            categories,
            transactions: signed,
        });
    }

    for direction in [Direction::Debit, Direction::Credit] {
        let transactions: Decimal = txns
            .iter()
            .filter(|t| t.direction == direction)
            .map(|t| t.amount)
            .sum();
        let categories: Decimal = summary
            .by_category
            .iter()
            .map(|c| match direction {
                Direction::Debit => c.debit_total,
                Direction::Credit => c.credit_total,
            })
            .sum();
        if categories != transactions {
            return Err(SumMismatch::Direction {
                direction,
                categories,
                transactions,
            });
        }
    }

    if summary.net != signed {
        return Err(SumMismatch::Net {
            net: summary.net,
            transactions: signed,
        });
    }
    Ok(())
}
