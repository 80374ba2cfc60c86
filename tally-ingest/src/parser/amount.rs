//! Monetary amount tokens and the right-to-left amount scan.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use tally_core::Direction;

use crate::types::Rejection;

/// Which character separates the fraction digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalConvention {
    /// `1,234.56`
    #[default]
    Dot,
    /// `1.234,56`
    Comma,
}

fn dot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\()?(-)?([$€£])?(-)?(\d{1,3}(?:,\d{3})+|\d+)\.(\d{2})(\))?$")
            .expect("dot amount regex")
    })
}

fn comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\()?(-)?([$€£])?(-)?(\d{1,3}(?:\.\d{3})+|\d+),(\d{2})(\))?$")
            .expect("comma amount regex")
    })
}

impl DecimalConvention {
    fn regex(&self) -> &'static Regex {
        match self {
            DecimalConvention::Dot => dot_re(),
            DecimalConvention::Comma => comma_re(),
        }
    }

    /// Parse one whitespace-free token.
    ///
    /// `Ok(None)` means "not an amount"; `Err` means it looks like one but does
    /// not fit a fixed-point decimal.
    pub(crate) fn parse_token(&self, token: &str) -> Result<Option<AmountToken>, Rejection> {
        let Some(c) = self.regex().captures(token) else {
            return Ok(None);
        };
        let parens = c.get(1).is_some();
        if parens != c.get(7).is_some() {
            return Ok(None);
        }

        let int_part: String = c[5].chars().filter(|ch| ch.is_ascii_digit()).collect();
        let magnitude = Decimal::from_str(&format!("{}.{}", int_part, &c[6]))
            .map_err(|_| Rejection::AmountOutOfRange)?;

        Ok(Some(AmountToken {
            magnitude,
            negative: parens || c.get(2).is_some() || c.get(4).is_some(),
            marker: None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AmountToken {
    /// Unsigned value
    pub magnitude: Decimal,
    /// Leading minus or enclosing parentheses
    pub negative: bool,
    /// Trailing CR / DR marker
    pub marker: Option<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AmountScan {
    pub amount: AmountToken,
    /// Byte offset where the amount (and any detached sign) begins
    pub start: usize,
    pub balance: Option<Decimal>,
}

/// Whitespace-separated tokens with their byte offsets.
fn tokens(s: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, ch) in s.char_indices() {
        if ch.is_whitespace() {
            if let Some(st) = start.take() {
                out.push((st, &s[st..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(st) = start {
        out.push((st, &s[st..]));
    }
    out
}

fn marker(token: &str) -> Option<Direction> {
    if token.eq_ignore_ascii_case("CR") {
        Some(Direction::Credit)
    } else if token.eq_ignore_ascii_case("DR") {
        Some(Direction::Debit)
    } else {
        None
    }
}

/// Scan `text` right-to-left for the transaction amount.
///
/// With `balance_column`, the rightmost amount is a running balance and the
/// next one to its left is the transaction amount (when there is one).
pub(crate) fn scan_amount(
    text: &str,
    convention: DecimalConvention,
    balance_column: bool,
) -> Result<Option<AmountScan>, Rejection> {
    let toks = tokens(text);

    let mut found: Vec<(usize, AmountToken)> = Vec::with_capacity(2);
    for (i, (_, tok)) in toks.iter().enumerate().rev() {
        if let Some(a) = convention.parse_token(tok)? {
            found.push((i, a));
            if !balance_column || found.len() == 2 {
                break;
            }
        }
    }

    let (idx, mut amount, balance) = match found.as_slice() {
        [] => return Ok(None),
        [(i, a)] => (*i, *a, None),
        [(_, bal), (i, a), ..] => {
            let signed_balance = if bal.negative { -bal.magnitude } else { bal.magnitude };
            (*i, *a, Some(signed_balance))
        }
    };

    if let Some((_, next)) = toks.get(idx + 1) {
        amount.marker = marker(next);
    }

    // detached sign or currency symbol: "- $14.05", "$ 5.82"
    let mut start = toks[idx].0;
    if idx > 0 {
        let (prev_start, prev) = toks[idx - 1];
        match prev {
            "-" => {
                amount.negative = true;
                start = prev_start;
            }
            "$" | "€" | "£" => start = prev_start,
            "-$" | "-€" | "-£" => {
                amount.negative = true;
                start = prev_start;
            }
            _ => {}
        }
    }

    Ok(Some(AmountScan {
        amount,
        start,
        balance,
    }))
}
