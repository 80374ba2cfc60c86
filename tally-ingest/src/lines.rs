//! Line classification: split page text into lines and drop statement boilerplate.
//!
//! A line is discarded when one boilerplate pattern matches the *whole* trimmed
//! line (case-insensitive). Blank lines are discarded too. Order is never
//! changed, so the parser can treat neighbouring retained lines as
//! continuations of one entry.

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::{ExtractedPage, LineTag, StatementLine};

/// Built-in boilerplate patterns, highest priority first.
pub const DEFAULT_BOILERPLATE: &[&str] = &[
    r"page\s+\d+\s+of\s+\d+",
    r"page\s+\d+",
    r"-?\s*\d{1,3}\s*-?",
    r"(?:trans(?:action)?\.?\s+|post(?:ing)?\s+)?date\b.*\bdescription\b.*",
    r".*\bmember\s+fdic\b.*",
    r".*\bequal\s+housing\s+lender\b.*",
    r"statement\s+period\b.*",
    r"(?:for\s+the\s+)?period\s+(?:from|ending)\b.*",
    r".*\bcontinued\s+on\s+(?:the\s+)?next\s+page\b.*",
    r"(?:sub)?totals?\b.*",
];

#[derive(Debug, Clone)]
pub struct LineClassifier {
    rules: Vec<Regex>,
}

impl LineClassifier {
    /// Compile boilerplate patterns (priority order). Each must match a full line.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("(?i)^(?:{p})$")).map_err(|source| {
                    ConfigError::InvalidPattern {
                        pattern: p.to_string(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_BOILERPLATE)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Tag a single trimmed line.
    pub fn tag(&self, line: &str) -> LineTag {
        if line.is_empty() {
            return LineTag::Discarded { rule: None };
        }
        match self.rules.iter().position(|re| re.is_match(line)) {
            Some(rule) => LineTag::Discarded { rule: Some(rule) },
            None => LineTag::Retained,
        }
    }

    /// Split every page into lines and tag each one.
    pub fn classify(&self, pages: &[ExtractedPage]) -> Vec<StatementLine> {
        let mut out = Vec::new();
        let mut index = 0;

        for page in pages {
            for raw in page.text.lines() {
                let text = raw.trim().to_string();
                let tag = self.tag(&text);
                out.push(StatementLine {
                    index,
                    page: page.number,
                    text,
                    tag,
                });
                index += 1;
            }
        }

        let retained = out.iter().filter(|l| l.is_retained()).count();
        debug!(
            lines = out.len(),
            retained,
            discarded = out.len() - retained,
            "classified statement lines"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> ExtractedPage {
        ExtractedPage {
            number: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_discards_boilerplate_keeps_order() {
        let c = LineClassifier::with_defaults().unwrap();
        let lines = c.classify(&[page(
            "First National Bank\n\
             Page 1 of 3\n\
             Date        Description                 Amount\n\
             01/15/2024  STARBUCKS COFFEE            -5.75\n\
             \n\
             Member FDIC\n\
             01/16/2024  SHELL OIL 5443              -40.00\n\
             2\n",
        )]);

        let kept: Vec<&str> = lines
            .iter()
            .filter(|l| l.is_retained())
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(
            kept,
            vec![
                "First National Bank",
                "01/15/2024  STARBUCKS COFFEE            -5.75",
                "01/16/2024  SHELL OIL 5443              -40.00",
            ]
        );
        // nothing is dropped from the sequence, only tagged
        assert_eq!(lines.len(), 8);
        assert!(lines.windows(2).all(|w| w[0].index + 1 == w[1].index));
    }

    #[test]
    fn test_partial_match_is_retained() {
        let c = LineClassifier::new(&["page \\d+"]).unwrap();
        assert_eq!(c.tag("Page 4"), LineTag::Discarded { rule: Some(0) });
        assert_eq!(c.tag("01/02/2024 PAGE 4 BOOKS 12.00"), LineTag::Retained);
    }

    #[test]
    fn test_blank_line_discarded_without_rule() {
        let c = LineClassifier::new::<&str>(&[]).unwrap();
        assert_eq!(c.tag(""), LineTag::Discarded { rule: None });
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = LineClassifier::new(&["(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_line_index_spans_pages() {
        let c = LineClassifier::with_defaults().unwrap();
        let pages = vec![
            ExtractedPage { number: 1, text: "a\nb".into() },
            ExtractedPage { number: 2, text: "c".into() },
        ];
        let lines = c.classify(&pages);
        assert_eq!(lines[2].index, 2);
        assert_eq!(lines[2].page, 2);
    }
}
