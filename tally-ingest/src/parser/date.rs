//! Date recognizers. Each one matches at the start of a trimmed line.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Supported leading-date shapes, tried in configured priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `01/15/2024`
    MonthDayYear,
    /// `01/15/24`, two-digit years are 20xx
    MonthDayShortYear,
    /// `2024-01-15` (ISO 8601, optional time part)
    Iso,
    /// `01-15-2024`
    MonthDayYearDash,
    /// `15-01-24`, two-digit years are 20xx
    DayMonthShortYear,
    /// `Jan 15`, year inferred
    MonthNameDay,
    /// `01/15`, year inferred
    MonthDay,
}

pub const DEFAULT_DATE_FORMATS: &[DateFormat] = &[
    DateFormat::MonthDayYear,
    DateFormat::MonthDayShortYear,
    DateFormat::Iso,
    DateFormat::MonthDayYearDash,
    DateFormat::DayMonthShortYear,
    DateFormat::MonthNameDay,
    DateFormat::MonthDay,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateValue {
    Full(NaiveDate),
    YearLess { month: u32, day: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DateMatch {
    pub value: DateValue,
    /// Byte offset just past the date text
    pub end: usize,
}

fn mdy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})(?:\s|$)").expect("mdy regex"))
}

fn mdy_short_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})(?:\s|$)").expect("mdy short regex"))
}

fn mdy_dash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})(?:\s|$)").expect("mdy dash regex"))
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:T[0-9:.]+(?:Z|[+-]\d{2}:?\d{2})?)?(?:\s|$)")
            .expect("iso regex")
    })
}

fn dmy_short_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{2})(?:\s|$)").expect("dmy regex"))
}

const MONTH_NAMES: &str = concat!(
    r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?",
    r"|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?"
);

fn month_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)^({MONTH_NAMES})\.?\s+(\d{{1,2}}),?(?:\s|$)")).expect("month name regex")
    })
}

fn md_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})(?:\s|$)").expect("md regex"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex"))
}

/// `Dec 1 - Jan 31, 2024`, `Dec 1, 2023 through Jan 31, 2024`
fn named_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            concat!(
                r"(?i)\b({m})\.?\s+\d{{1,2}}(?:,?\s+((?:19|20)\d{{2}}))?",
                r"\s*(?:-|\x{{2013}}|to|through|thru)\s*",
                r"({m})\.?\s+\d{{1,2}},?\s+((?:19|20)\d{{2}})\b"
            ),
            m = MONTH_NAMES
        ))
        .expect("named period regex")
    })
}

/// `12/01 - 01/31/2024`, `12/01/2023 - 01/31/2024`
fn numeric_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\b(\d{1,2})/\d{1,2}(?:/((?:19|20)\d{2}))?",
            r"\s*(?:-|\x{2013}|to|through|thru)\s*",
            r"(\d{1,2})/\d{1,2}/((?:19|20)\d{2})\b"
        ))
        .expect("numeric period regex")
    })
}

fn month_from_abbrev(s: &str) -> Option<u32> {
    let key: String = s.chars().take(3).collect::<String>().to_ascii_lowercase();
    let m = match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

/// Month/day pair that exists in some year (Feb 29 allowed).
fn valid_month_day(month: u32, day: u32) -> bool {
    NaiveDate::from_ymd_opt(2000, month, day).is_some()
}

impl DateFormat {
    /// Try this recognizer against the start of `line`. Calendar-invalid
    /// matches return `None` so the next recognizer gets a turn.
    pub(crate) fn recognize(&self, line: &str) -> Option<DateMatch> {
        let (caps, value) = match self {
            DateFormat::MonthDayYear => {
                let c = mdy_re().captures(line)?;
                let d = NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)?;
                (c, DateValue::Full(d))
            }
            DateFormat::MonthDayShortYear => {
                let c = mdy_short_re().captures(line)?;
                let yy: i32 = c[3].parse().ok()?;
                let d = NaiveDate::from_ymd_opt(2000 + yy, c[1].parse().ok()?, c[2].parse().ok()?)?;
                (c, DateValue::Full(d))
            }
            DateFormat::MonthDayYearDash => {
                let c = mdy_dash_re().captures(line)?;
                let d = NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)?;
                (c, DateValue::Full(d))
            }
            DateFormat::Iso => {
                let c = iso_re().captures(line)?;
                let d = NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)?;
                (c, DateValue::Full(d))
            }
            DateFormat::DayMonthShortYear => {
                let c = dmy_short_re().captures(line)?;
                let yy: i32 = c[3].parse().ok()?;
                let d = NaiveDate::from_ymd_opt(2000 + yy, c[2].parse().ok()?, c[1].parse().ok()?)?;
                (c, DateValue::Full(d))
            }
            DateFormat::MonthNameDay => {
                let c = month_name_re().captures(line)?;
                let month = month_from_abbrev(&c[1])?;
                let day: u32 = c[2].parse().ok()?;
                if !valid_month_day(month, day) {
                    return None;
                }
                (c, DateValue::YearLess { month, day })
            }
            DateFormat::MonthDay => {
                let c = md_re().captures(line)?;
                let month: u32 = c[1].parse().ok()?;
                let day: u32 = c[2].parse().ok()?;
                if !valid_month_day(month, day) {
                    return None;
                }
                (c, DateValue::YearLess { month, day })
            }
        };

        let end = caps.get(0)?.end();
        Some(DateMatch { value, end })
    }
}

/// Where year-less dates start counting from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearAnchor {
    /// Year of the first statement month
    pub year: i32,
    /// First month of a statement period that crosses a year end
    pub wrap_month: Option<u32>,
}

impl YearAnchor {
    pub fn new(year: i32) -> Self {
        Self { year, wrap_month: None }
    }

    fn from_period(start_month: u32, start_year: Option<i32>, end_month: u32, end_year: i32) -> Option<Self> {
        if !(1..=12).contains(&start_month) || !(1..=12).contains(&end_month) {
            return None;
        }
        let wraps = start_month > end_month;
        let year = start_year.unwrap_or(if wraps { end_year - 1 } else { end_year });
        Some(Self {
            year,
            wrap_month: wraps.then_some(start_month),
        })
    }
}

fn period_anchor(line: &str) -> Option<YearAnchor> {
    if let Some(c) = named_period_re().captures(line) {
        let start = month_from_abbrev(&c[1])?;
        let end = month_from_abbrev(&c[3])?;
        let start_year = c.get(2).and_then(|y| y.as_str().parse().ok());
        return YearAnchor::from_period(start, start_year, end, c[4].parse().ok()?);
    }
    let c = numeric_period_re().captures(line)?;
    let start_year = c.get(2).and_then(|y| y.as_str().parse().ok());
    YearAnchor::from_period(c[1].parse().ok()?, start_year, c[3].parse().ok()?, c[4].parse().ok()?)
}

/// A 4-digit year that is not the integer part of an amount
/// (`2000.00`, `$1999`, `1999,00`).
fn standalone_year(line: &str) -> Option<i32> {
    year_re().find_iter(line).find_map(|m| {
        let before = line[..m.start()].chars().next_back();
        let mut after = line[m.end()..].chars();
        let decimal_part = matches!(after.next(), Some('.' | ','))
            && after.next().is_some_and(|c| c.is_ascii_digit());
        let currency = matches!(before, Some('$' | '€' | '£'));
        if decimal_part || currency {
            None
        } else {
            m.as_str().parse().ok()
        }
    })
}

/// Find the statement year in document order: a statement period range on a
/// line wins for that line, otherwise the first plausible 4-digit year.
pub fn detect_year<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<YearAnchor> {
    lines
        .into_iter()
        .find_map(|l| period_anchor(l).or_else(|| standalone_year(l).map(YearAnchor::new)))
}

/// Tracks the year to attach to year-less dates while walking a document.
#[derive(Debug, Clone)]
pub struct YearContext {
    year: i32,
    wrap_month: Option<u32>,
    last_month: Option<u32>,
}

impl YearContext {
    pub fn new(year: i32) -> Self {
        Self::from_anchor(YearAnchor::new(year))
    }

    pub fn from_anchor(anchor: YearAnchor) -> Self {
        Self {
            year: anchor.year,
            wrap_month: anchor.wrap_month,
            last_month: None,
        }
    }

    /// A full date re-anchors the context.
    pub fn observe(&mut self, date: NaiveDate) {
        self.year = date.year();
        self.wrap_month = None;
        self.last_month = Some(date.month());
    }

    /// Attach a year; a December -> January step rolls the year over. In a
    /// period crossing a year end, a first row before the start month already
    /// belongs to the closing year.
    pub fn resolve(&mut self, month: u32, day: u32) -> Option<NaiveDate> {
        match (self.last_month, self.wrap_month) {
            (None, Some(start)) if month < start => self.year += 1,
            (Some(12), _) if month == 1 => self.year += 1,
            _ => {}
        }
        let date = NaiveDate::from_ymd_opt(self.year, month, day)?;
        self.last_month = Some(month);
        Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_day_year() {
        let m = DateFormat::MonthDayYear
            .recognize("01/15/2024 STARBUCKS COFFEE -5.75")
            .unwrap();
        assert_eq!(m.value, DateValue::Full(ymd(2024, 1, 15)));
        assert_eq!(&"01/15/2024 STARBUCKS COFFEE -5.75"[m.end..], "STARBUCKS COFFEE -5.75");
    }

    #[test]
    fn test_invalid_calendar_date_falls_through() {
        assert!(DateFormat::MonthDayYear.recognize("02/30/2024 X 1.00").is_none());
        assert!(DateFormat::MonthDayYear.recognize("13/01/2024 X 1.00").is_none());
    }

    #[test]
    fn test_iso_and_short_year() {
        let iso = DateFormat::Iso.recognize("2024-03-02 PAYROLL 1.00").unwrap();
        assert_eq!(iso.value, DateValue::Full(ymd(2024, 3, 2)));
        let iso_t = DateFormat::Iso.recognize("2024-03-02T10:15:00Z PAYROLL").unwrap();
        assert_eq!(iso_t.value, DateValue::Full(ymd(2024, 3, 2)));

        let dmy = DateFormat::DayMonthShortYear.recognize("15-01-24 RENT").unwrap();
        assert_eq!(dmy.value, DateValue::Full(ymd(2024, 1, 15)));
    }

    #[test]
    fn test_us_short_year_and_dash_forms() {
        let line = "01/15/24 STARBUCKS -5.75";
        let m = DateFormat::MonthDayShortYear.recognize(line).unwrap();
        assert_eq!(m.value, DateValue::Full(ymd(2024, 1, 15)));
        assert_eq!(&line[m.end..], "STARBUCKS -5.75");
        assert!(DateFormat::MonthDay.recognize(line).is_none());

        let m = DateFormat::MonthDayYearDash.recognize("01-15-2024 RENT -900.00").unwrap();
        assert_eq!(m.value, DateValue::Full(ymd(2024, 1, 15)));
        // day-first short form keeps its own shape
        assert!(DateFormat::MonthDayYearDash.recognize("15-01-24 RENT").is_none());
        assert!(DateFormat::MonthDayShortYear.recognize("13/01/24 X").is_none());
    }

    #[test]
    fn test_default_order_finds_every_shape() {
        let first = |line: &str| DEFAULT_DATE_FORMATS.iter().find_map(|f| f.recognize(line)).map(|m| m.value);
        assert_eq!(first("01/15/24 X"), Some(DateValue::Full(ymd(2024, 1, 15))));
        assert_eq!(first("01-15-2024 X"), Some(DateValue::Full(ymd(2024, 1, 15))));
        assert_eq!(first("15-01-24 X"), Some(DateValue::Full(ymd(2024, 1, 15))));
        assert_eq!(first("01/15 X"), Some(DateValue::YearLess { month: 1, day: 15 }));
    }

    #[test]
    fn test_year_less_forms() {
        let m = DateFormat::MonthNameDay.recognize("Jul 20 H-E-B #455 $5.82").unwrap();
        assert_eq!(m.value, DateValue::YearLess { month: 7, day: 20 });
        let m = DateFormat::MonthNameDay.recognize("SEPT 3 THING 1.00").unwrap();
        assert_eq!(m.value, DateValue::YearLess { month: 9, day: 3 });
        let m = DateFormat::MonthDay.recognize("04/22 Discover E-Payment -15.00").unwrap();
        assert_eq!(m.value, DateValue::YearLess { month: 4, day: 22 });
        // full dates are not swallowed by the short form
        assert!(DateFormat::MonthDay.recognize("04/22/2024 X").is_none());
    }

    #[test]
    fn test_not_a_date() {
        for f in DEFAULT_DATE_FORMATS {
            assert!(f.recognize("Member FDIC").is_none());
            assert!(f.recognize("MARKET 12 STREET DELI 4.50").is_none());
            assert!(f.recognize("Total 1,234.56").is_none());
        }
    }

    #[test]
    fn test_year_context_rollover() {
        let mut ctx = YearContext::new(2023);
        assert_eq!(ctx.resolve(12, 28), Some(ymd(2023, 12, 28)));
        assert_eq!(ctx.resolve(1, 3), Some(ymd(2024, 1, 3)));
        assert_eq!(ctx.resolve(1, 9), Some(ymd(2024, 1, 9)));
    }

    #[test]
    fn test_detect_year() {
        let lines = ["ACME BANK", "Statement period Jan 1 - Jan 31, 2024", "2025"];
        assert_eq!(detect_year(lines), Some(YearAnchor::new(2024)));
        assert_eq!(detect_year(["no year here"]), None);
    }

    #[test]
    fn test_detect_year_skips_amounts() {
        let lines = ["ACME BANK", "Jan 5 RENT -2000.00", "Jan 9 GIFT $1999", "Jan 12 EURO 2010,50"];
        assert_eq!(detect_year(lines), None);

        let lines = ["Jan 5 RENT -2000.00", "Closing date 01/31/2024"];
        assert_eq!(detect_year(lines), Some(YearAnchor::new(2024)));
    }

    #[test]
    fn test_period_with_closing_year_only() {
        let anchor = detect_year(["Statement period Dec 1 - Jan 31, 2024"]).unwrap();
        assert_eq!(anchor, YearAnchor { year: 2023, wrap_month: Some(12) });

        let mut ctx = YearContext::from_anchor(anchor);
        assert_eq!(ctx.resolve(12, 30), Some(ymd(2023, 12, 30)));
        assert_eq!(ctx.resolve(1, 2), Some(ymd(2024, 1, 2)));

        // no December rows: January still lands on the printed year
        let mut ctx = YearContext::from_anchor(anchor);
        assert_eq!(ctx.resolve(1, 5), Some(ymd(2024, 1, 5)));

        let anchor = detect_year(["Period 12/01 - 01/31/2025"]).unwrap();
        assert_eq!(anchor.year, 2024);
        let anchor = detect_year(["Dec 1, 2023 through Jan 31, 2024"]).unwrap();
        assert_eq!(anchor.year, 2023);
        let anchor = detect_year(["Mar 1 - Mar 31, 2024"]).unwrap();
        assert_eq!(anchor, YearAnchor::new(2024));
    }
}
