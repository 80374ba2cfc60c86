//! Transaction parser: retained statement lines -> transaction candidates.
//!
//! Each line is tried against the configured date recognizers (first match
//! wins). The rest of the line is scanned right-to-left for an amount, and the
//! text in between becomes the description. A dated line with no amount may
//! take its amount from the next one or two lines.

mod amount;
mod date;
mod direction;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tally_core::Direction;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::{
    DirectionSource, ParseOutcome, ParsedTransaction, PendingCandidate, Rejection, StatementLine,
};

pub use amount::DecimalConvention;
pub use date::{DEFAULT_DATE_FORMATS, DateFormat, YearAnchor, YearContext, detect_year};
pub use direction::{DEFAULT_CREDIT_KEYWORDS, DEFAULT_DEBIT_KEYWORDS};

use amount::{AmountScan, scan_amount};
use date::DateValue;
use direction::DirectionKeywords;

const CONTINUATION_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Date recognizers in priority order
    pub date_formats: Vec<DateFormat>,
    pub decimal_convention: DecimalConvention,
    /// How many following lines may supply a missing amount (1 or 2)
    pub continuation_lookahead: usize,
    /// Statement rows end with a running balance column
    pub balance_column: bool,
    pub debit_keywords: Vec<String>,
    pub credit_keywords: Vec<String>,
    pub continuation_confidence: f64,
    pub keyword_confidence: f64,
    pub default_confidence: f64,
    /// Year for year-less dates when the document names none
    pub fallback_year: Option<i32>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            date_formats: DEFAULT_DATE_FORMATS.to_vec(),
            decimal_convention: DecimalConvention::Dot,
            continuation_lookahead: 2,
            balance_column: false,
            debit_keywords: DEFAULT_DEBIT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            credit_keywords: DEFAULT_CREDIT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            continuation_confidence: 0.6,
            keyword_confidence: 0.8,
            default_confidence: 0.6,
            fallback_year: None,
        }
    }
}

impl ParserConfig {
    fn validate(&self) -> Result<()> {
        if self.date_formats.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "parser.date_formats",
                details: "at least one date format is required".to_string(),
            });
        }
        if !(1..=2).contains(&self.continuation_lookahead) {
            return Err(ConfigError::InvalidSetting {
                name: "parser.continuation_lookahead",
                details: format!("must be 1 or 2, got {}", self.continuation_lookahead),
            });
        }
        for (name, value) in [
            ("parser.continuation_confidence", self.continuation_confidence),
            ("parser.keyword_confidence", self.keyword_confidence),
            ("parser.default_confidence", self.default_confidence),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidSetting {
                    name,
                    details: format!("must be in (0, 1], got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Line counters for one parse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub lines: usize,
    pub parsed: usize,
    pub continuations: usize,
    pub no_date: usize,
    pub no_amount: usize,
    pub out_of_range: usize,
}

impl ParseStats {
    fn reject(&mut self, r: Rejection) {
        match r {
            Rejection::NoDate => self.no_date += 1,
            Rejection::NoAmount => self.no_amount += 1,
            Rejection::AmountOutOfRange => self.out_of_range += 1,
        }
    }
}

/// Compiled parser. Immutable once built; safe to share across threads.
#[derive(Debug, Clone)]
pub struct TransactionParser {
    cfg: ParserConfig,
    keywords: DirectionKeywords,
}

impl TransactionParser {
    pub fn new(cfg: ParserConfig) -> Result<Self> {
        cfg.validate()?;
        let keywords = DirectionKeywords::new(&cfg.debit_keywords, &cfg.credit_keywords);
        Ok(Self { cfg, keywords })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.cfg
    }

    /// Lazily parse the retained lines of `lines`.
    ///
    /// Every line (discarded ones included) is searched for the statement
    /// year used by year-less dates; amounts never count as a year.
    pub fn parse<'a>(&'a self, lines: &'a [StatementLine]) -> Candidates<'a> {
        let anchor = detect_year(lines.iter().map(|l| l.text.as_str())).unwrap_or_else(|| {
            YearAnchor::new(self.cfg.fallback_year.unwrap_or_else(|| Utc::now().year()))
        });

        Candidates {
            parser: self,
            lines: lines.iter().filter(|l| l.is_retained()).collect(),
            pos: 0,
            year: YearContext::from_anchor(anchor),
            stats: ParseStats::default(),
            logged: false,
        }
    }

    fn recognize_date(&self, text: &str) -> Option<date::DateMatch> {
        self.cfg.date_formats.iter().find_map(|f| f.recognize(text))
    }

    /// Parse one line on its own.
    pub fn parse_line(&self, text: &str, line_index: usize, year: &mut YearContext) -> ParseOutcome {
        let text = text.trim();
        let Some(m) = self.recognize_date(text) else {
            return ParseOutcome::Rejected(Rejection::NoDate);
        };

        let date = match m.value {
            DateValue::Full(d) => {
                year.observe(d);
                d
            }
            DateValue::YearLess { month, day } => match year.resolve(month, day) {
                Some(d) => d,
                None => return ParseOutcome::Rejected(Rejection::NoDate),
            },
        };

        let mut rest = &text[m.end..];
        // posting date column: "01/14 01/15 MERCHANT 4.00"
        let trimmed = rest.trim_start();
        if let Some(second) = self
            .cfg
            .date_formats
            .iter()
            .find_map(|f| f.recognize(trimmed).filter(|s| same_shape(s.value, m.value)))
        {
            rest = &trimmed[second.end..];
        }

        match scan_amount(rest, self.cfg.decimal_convention, self.cfg.balance_column) {
            Err(r) => ParseOutcome::Rejected(r),
            Ok(None) => ParseOutcome::ContinuationPending(PendingCandidate {
                date,
                description: collapse_ws(rest),
                line_index,
                raw_lines: vec![text.to_string()],
            }),
            Ok(Some(scan)) => {
                let description = collapse_ws(&rest[..scan.start]);
                ParseOutcome::Parsed(self.finish(
                    date,
                    description,
                    scan,
                    line_index,
                    0,
                    text.to_string(),
                ))
            }
        }
    }

    /// Feed the line after a pending candidate. A line that carries its own
    /// date is never consumed as a continuation.
    pub fn resume(&self, mut pending: PendingCandidate, text: &str) -> ParseOutcome {
        let text = text.trim();
        if self.recognize_date(text).is_some() {
            return ParseOutcome::Rejected(Rejection::NoAmount);
        }

        match scan_amount(text, self.cfg.decimal_convention, self.cfg.balance_column) {
            Err(r) => ParseOutcome::Rejected(r),
            Ok(None) => {
                push_words(&mut pending.description, text);
                pending.raw_lines.push(text.to_string());
                ParseOutcome::ContinuationPending(pending)
            }
            Ok(Some(scan)) => {
                push_words(&mut pending.description, &text[..scan.start]);
                pending.raw_lines.push(text.to_string());
                let consumed = pending.raw_lines.len() - 1;
                ParseOutcome::Parsed(self.finish(
                    pending.date,
                    pending.description,
                    scan,
                    pending.line_index,
                    consumed,
                    pending.raw_lines.join(CONTINUATION_SEPARATOR),
                ))
            }
        }
    }

    fn finish(
        &self,
        date: NaiveDate,
        description: String,
        scan: AmountScan,
        line_index: usize,
        continuation_lines: usize,
        raw_line: String,
    ) -> ParsedTransaction {
        // sign is authoritative; keywords only decide unsigned amounts
        let (direction, direction_source) = if scan.amount.negative {
            (Direction::Debit, DirectionSource::Sign)
        } else if let Some(d) = scan.amount.marker {
            (d, DirectionSource::Sign)
        } else if let Some(d) = self.keywords.infer(&description) {
            (d, DirectionSource::Keyword)
        } else {
            (Direction::Credit, DirectionSource::Default)
        };

        let mut confidence: f64 = 1.0;
        if continuation_lines > 0 {
            confidence = confidence.min(self.cfg.continuation_confidence);
        }
        match direction_source {
            DirectionSource::Sign => {}
            DirectionSource::Keyword => confidence = confidence.min(self.cfg.keyword_confidence),
            DirectionSource::Default => confidence = confidence.min(self.cfg.default_confidence),
        }

        ParsedTransaction {
            date,
            description,
            amount: direction.sign(scan.amount.magnitude),
            direction,
            direction_source,
            balance: scan.balance,
            confidence,
            line_index,
            continuation_lines,
            raw_line,
        }
    }
}

fn same_shape(a: DateValue, b: DateValue) -> bool {
    matches!(
        (a, b),
        (DateValue::Full(_), DateValue::Full(_)) | (DateValue::YearLess { .. }, DateValue::YearLess { .. })
    )
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_words(description: &mut String, more: &str) {
    let more = collapse_ws(more);
    if more.is_empty() {
        return;
    }
    if !description.is_empty() {
        description.push(' ');
    }
    description.push_str(&more);
}

/// Lazy candidate sequence returned by [`TransactionParser::parse`].
pub struct Candidates<'a> {
    parser: &'a TransactionParser,
    lines: Vec<&'a StatementLine>,
    pos: usize,
    year: YearContext,
    stats: ParseStats,
    logged: bool,
}

impl Candidates<'_> {
    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Try to complete `pending` from the following lines.
    fn follow(&mut self, mut pending: PendingCandidate) -> Option<ParsedTransaction> {
        let line_index = pending.line_index;
        for _ in 0..self.parser.cfg.continuation_lookahead {
            let Some(next) = self.lines.get(self.pos).copied() else {
                break;
            };
            match self.parser.resume(pending, &next.text) {
                ParseOutcome::Parsed(t) => {
                    self.pos += 1;
                    self.stats.continuations += 1;
                    return Some(t);
                }
                ParseOutcome::ContinuationPending(p) => {
                    self.pos += 1;
                    pending = p;
                }
                ParseOutcome::Rejected(r) => {
                    if r != Rejection::NoAmount {
                        self.stats.reject(r);
                    }
                    break;
                }
            }
        }
        debug!(line = line_index, "dated line without amount abandoned");
        self.stats.reject(Rejection::NoAmount);
        None
    }
}

impl Iterator for Candidates<'_> {
    type Item = ParsedTransaction;

    fn next(&mut self) -> Option<ParsedTransaction> {
        while let Some(line) = self.lines.get(self.pos).copied() {
            self.pos += 1;
            self.stats.lines += 1;

            let found = match self.parser.parse_line(&line.text, line.index, &mut self.year) {
                ParseOutcome::Parsed(t) => Some(t),
                ParseOutcome::ContinuationPending(p) => self.follow(p),
                ParseOutcome::Rejected(r) => {
                    self.stats.reject(r);
                    None
                }
            };
            if let Some(t) = found {
                self.stats.parsed += 1;
                return Some(t);
            }
        }

        if !self.logged {
            self.logged = true;
            let s = self.stats;
            debug!(
                lines = s.lines,
                parsed = s.parsed,
                continuations = s.continuations,
                no_date = s.no_date,
                no_amount = s.no_amount,
                out_of_range = s.out_of_range,
                "parsed statement lines"
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::LineClassifier;
    use crate::types::ExtractedPage;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lines(text: &str) -> Vec<StatementLine> {
        LineClassifier::with_defaults().unwrap().classify(&[ExtractedPage {
            number: 1,
            text: text.to_string(),
        }])
    }

    fn parse_all(parser: &TransactionParser, text: &str) -> Vec<ParsedTransaction> {
        let ls = lines(text);
        parser.parse(&ls).collect()
    }

    fn default_parser() -> TransactionParser {
        TransactionParser::new(ParserConfig::default()).unwrap()
    }

    #[test]
    fn test_signed_single_line() {
        let txns = parse_all(&default_parser(), "01/15/2024 STARBUCKS COFFEE -5.75");
        assert_eq!(txns.len(), 1);
        let t = &txns[0];
        assert_eq!(t.date, ymd(2024, 1, 15));
        assert_eq!(t.description, "STARBUCKS COFFEE");
        assert_eq!(t.amount, dec("-5.75"));
        assert_eq!(t.direction, Direction::Debit);
        assert_eq!(t.direction_source, DirectionSource::Sign);
        assert_eq!(t.confidence, 1.0);
    }

    #[test]
    fn test_keyword_credit() {
        let txns = parse_all(&default_parser(), "03/02/2024 PAYROLL DEPOSIT 1500.00");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].direction, Direction::Credit);
        assert_eq!(txns[0].direction_source, DirectionSource::Keyword);
        assert_eq!(txns[0].amount, dec("1500.00"));
        assert_eq!(txns[0].confidence, 0.8);
    }

    #[test]
    fn test_keyword_debit_is_stored_negative() {
        let txns = parse_all(&default_parser(), "03/04/2024 ATM WITHDRAWAL 60.00");
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].amount, dec("-60.00"));
    }

    #[test]
    fn test_sign_beats_keyword() {
        // "refund" is a credit keyword, the minus sign wins
        let txns = parse_all(&default_parser(), "03/05/2024 REFUND REVERSAL (12.00)");
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].confidence, 1.0);
    }

    #[test]
    fn test_continuation_line() {
        let text = "01/20/2024 AMAZON MARKETPLACE\n-42.10\n";
        let txns = parse_all(&default_parser(), text);
        assert_eq!(txns.len(), 1);
        let t = &txns[0];
        assert_eq!(t.description, "AMAZON MARKETPLACE");
        assert_eq!(t.amount, dec("-42.10"));
        assert_eq!(t.continuation_lines, 1);
        assert_eq!(t.confidence, 0.6);
        assert_eq!(t.raw_line, "01/20/2024 AMAZON MARKETPLACE | -42.10");
    }

    #[test]
    fn test_two_line_continuation_and_limit() {
        let text = "01/20/2024 WIRE\nACME CORP REF 99\n2,000.00 CR\n";
        let txns = parse_all(&default_parser(), text);
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "WIRE ACME CORP REF 99");
        assert_eq!(txns[0].direction, Direction::Credit);
        assert_eq!(txns[0].continuation_lines, 2);

        let one = TransactionParser::new(ParserConfig {
            continuation_lookahead: 1,
            ..ParserConfig::default()
        })
        .unwrap();
        assert!(parse_all(&one, text).is_empty());
    }

    #[test]
    fn test_dated_line_is_not_a_continuation() {
        let text = "01/20/2024 PENDING HOLD\n01/21/2024 SHELL OIL -30.00\n";
        let txns = parse_all(&default_parser(), text);
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "SHELL OIL");
        assert_eq!(txns[0].date, ymd(2024, 1, 21));
    }

    #[test]
    fn test_undated_lines_are_skipped() {
        let ls = lines("Member FDIC\nThank you for banking with us\n");
        let parser = default_parser();
        let mut it = parser.parse(&ls);
        assert!(it.next().is_none());
        assert_eq!(it.stats().parsed, 0);
        assert_eq!(it.stats().no_date, 1);
    }

    #[test]
    fn test_year_inference_and_rollover() {
        let text = "Statement period Dec 1 2023 - Jan 31 2024\n\
                    Dec 30 GROCERY OUTLET -20.00\n\
                    Jan 2 CITY WATER -45.00\n";
        let txns = parse_all(&default_parser(), text);
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].date, ymd(2023, 12, 30));
        assert_eq!(txns[1].date, ymd(2024, 1, 2));
    }

    #[test]
    fn test_amount_is_not_the_statement_year() {
        let parser = TransactionParser::new(ParserConfig {
            fallback_year: Some(2024),
            ..ParserConfig::default()
        })
        .unwrap();
        let txns = parse_all(&parser, "ACME BANK\nJan 5 RENT -2000.00\nJan 9 COFFEE -4.50");
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].date, ymd(2024, 1, 5));
        assert_eq!(txns[0].amount, dec("-2000.00"));
        assert_eq!(txns[1].date, ymd(2024, 1, 9));
    }

    #[test]
    fn test_period_printing_only_closing_year() {
        let text = "Statement period Dec 1 - Jan 31, 2024\n\
                    Dec 30 GROCERY OUTLET -20.00\n\
                    Jan 2 CITY WATER -45.00\n";
        let txns = parse_all(&default_parser(), text);
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].date, ymd(2023, 12, 30));
        assert_eq!(txns[1].date, ymd(2024, 1, 2));
    }

    #[test]
    fn test_us_short_year_statement() {
        let text = "01/15/24 STARBUCKS -5.75\n01-16-2024 PAYROLL DEPOSIT 1500.00\n";
        let txns = parse_all(&default_parser(), text);
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].date, ymd(2024, 1, 15));
        assert_eq!(txns[0].description, "STARBUCKS");
        assert_eq!(txns[1].date, ymd(2024, 1, 16));
        assert_eq!(txns[1].direction, Direction::Credit);
    }

    #[test]
    fn test_fallback_year() {
        let parser = TransactionParser::new(ParserConfig {
            fallback_year: Some(2021),
            ..ParserConfig::default()
        })
        .unwrap();
        let txns = parse_all(&parser, "07/04 FIREWORKS -9.99");
        assert_eq!(txns[0].date, ymd(2021, 7, 4));
    }

    #[test]
    fn test_posting_date_and_balance_column() {
        let parser = TransactionParser::new(ParserConfig {
            balance_column: true,
            fallback_year: Some(2026),
            ..ParserConfig::default()
        })
        .unwrap();
        let txns = parse_all(
            &parser,
            "04/21 04/22 Discover E-Payment 8148 -15.00 53.70\n04/23 PAYROLL ACME INC 100.00 153.70",
        );
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].date, ymd(2026, 4, 21));
        assert_eq!(txns[0].description, "Discover E-Payment 8148");
        assert_eq!(txns[0].amount, dec("-15.00"));
        assert_eq!(txns[0].balance, Some(dec("53.70")));
        assert_eq!(txns[1].amount, dec("100.00"));
    }

    #[test]
    fn test_default_direction() {
        let txns = parse_all(&default_parser(), "05/01/2024 MYSTERY ITEM 7.00");
        assert_eq!(txns[0].direction, Direction::Credit);
        assert_eq!(txns[0].direction_source, DirectionSource::Default);
        assert_eq!(txns[0].confidence, 0.6);
    }

    #[test]
    fn test_source_order_and_count() {
        let text = "01/02/2024 A -1.00\nnoise\n01/03/2024 B -2.00\n01/04/2024 C -3.00\n";
        let txns = parse_all(&default_parser(), text);
        let descs: Vec<&str> = txns.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descs, vec!["A", "B", "C"]);
        assert!(txns.iter().all(|t| t.confidence > 0.0));
    }

    #[test]
    fn test_invalid_config() {
        let err = TransactionParser::new(ParserConfig {
            continuation_lookahead: 3,
            ..ParserConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("continuation_lookahead"));

        assert!(TransactionParser::new(ParserConfig {
            date_formats: vec![],
            ..ParserConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_parse_config_from_toml_like_json() {
        let cfg: ParserConfig =
            serde_json::from_str(r#"{"date_formats":["iso"],"decimal_convention":"comma"}"#).unwrap();
        assert_eq!(cfg.date_formats, vec![DateFormat::Iso]);
        assert_eq!(cfg.decimal_convention, DecimalConvention::Comma);
        assert_eq!(cfg.continuation_lookahead, 2);

        let parser = TransactionParser::new(cfg).unwrap();
        let txns = parse_all(&parser, "2024-02-03 BÄCKEREI -1.234,50");
        assert_eq!(txns[0].amount, dec("-1234.50"));
    }
}
