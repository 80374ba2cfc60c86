//! Deterministic category rules matched against transaction descriptions.
//!
//! The table is an ordered list; the first matching rule wins and anything
//! unmatched falls back to "Other". All matching is case-insensitive.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_core::Transaction;
use tally_ingest::ConfigError;

pub const FALLBACK_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Contains,
    StartsWith,
    /// Whole words only ("BP" matches "BP #1234" but not "BPX")
    Word,
    Regex,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Contains => "contains",
            MatchKind::StartsWith => "starts_with",
            MatchKind::Word => "word",
            MatchKind::Regex => "regex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "contains" => Some(MatchKind::Contains),
            "starts_with" | "prefix" => Some(MatchKind::StartsWith),
            "word" => Some(MatchKind::Word),
            "regex" => Some(MatchKind::Regex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
}

impl CategoryRule {
    pub fn new(pattern: impl Into<String>, category: impl Into<String>, match_kind: MatchKind) -> Self {
        Self {
            pattern: pattern.into(),
            category: category.into(),
            match_kind,
        }
    }
}

const DEFAULT_TABLE: &[(&str, &[&str], &[&str])] = &[
    // (category, substring patterns, whole-word patterns)
    ("Income", &["payroll", "salary", "direct deposit", "direct dep"], &[]),
    (
        "Dining",
        &["starbucks", "restaurant", "mcdonald", "burger", "pizza", "coffee", "cafe", "dining", "doordash"],
        &[],
    ),
    (
        "Groceries",
        &["walmart", "kroger", "publix", "safeway", "whole foods", "trader joe", "grocery", "supermarket", "h-e-b"],
        &[],
    ),
    ("Gas", &["exxon", "chevron", "mobil", "fuel"], &["shell", "bp", "gas", "station"]),
    ("Transportation", &["uber", "lyft", "taxi", "metro", "parking"], &["bus", "train", "toll"]),
    ("Shopping", &["amazon", "best buy", "retail", "shopping"], &["target", "mall"]),
    (
        "Entertainment",
        &["netflix", "spotify", "movie", "theater", "entertainment", "streaming"],
        &["game", "games"],
    ),
    ("Utilities", &["electric", "utility", "internet", "cable"], &["water", "phone"]),
    ("Healthcare", &["medical", "doctor", "hospital", "pharmacy", "health", "dental", "vision"], &[]),
    ("Education", &["tuition", "school", "college", "university", "textbook", "student"], &[]),
    ("Banking", &["bank", "overdraft", "transfer", "interest"], &["fee", "atm"]),
];

/// Built-in rule table, in priority order.
pub fn default_rules() -> Vec<CategoryRule> {
    DEFAULT_TABLE
        .iter()
        .flat_map(|(category, contains, words)| {
            contains
                .iter()
                .map(move |p| CategoryRule::new(*p, *category, MatchKind::Contains))
                .chain(words.iter().map(move |p| CategoryRule::new(*p, *category, MatchKind::Word)))
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    StartsWith(String),
    Word(String),
    Regex(Regex),
}

/// Upper-cased words separated and padded by single spaces.
fn word_key(s: &str) -> String {
    let mut out = String::from(" ");
    for w in s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        out.push_str(&w.to_uppercase());
        out.push(' ');
    }
    out
}

impl Matcher {
    fn compile(rule: &CategoryRule) -> Result<Self, ConfigError> {
        Ok(match rule.match_kind {
            MatchKind::Contains => Matcher::Contains(rule.pattern.to_uppercase()),
            MatchKind::StartsWith => Matcher::StartsWith(rule.pattern.trim().to_uppercase()),
            MatchKind::Word => Matcher::Word(word_key(&rule.pattern)),
            MatchKind::Regex => Matcher::Regex(
                Regex::new(&format!("(?i){}", rule.pattern)).map_err(|source| {
                    ConfigError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    }
                })?,
            ),
        })
    }

    fn is_match(&self, upper: &str, words: &str, original: &str) -> bool {
        match self {
            Matcher::Contains(p) => !p.is_empty() && upper.contains(p.as_str()),
            Matcher::StartsWith(p) => !p.is_empty() && upper.trim_start().starts_with(p.as_str()),
            Matcher::Word(p) => p.len() > 1 && words.contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(original),
        }
    }
}

/// Compiled, immutable rule table.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<(CategoryRule, Matcher)>,
    fallback: String,
}

impl Categorizer {
    pub fn new(rules: Vec<CategoryRule>) -> Result<Self, ConfigError> {
        let rules = rules
            .into_iter()
            .map(|r| Matcher::compile(&r).map(|m| (r, m)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            fallback: FALLBACK_CATEGORY.to_string(),
        })
    }

    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(default_rules())
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter().map(|(r, _)| r)
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Category for a description. Priority: first matching rule > fallback.
    pub fn categorize(&self, description: &str) -> &str {
        let upper = description.to_uppercase();
        let words = word_key(description);
        self.rules
            .iter()
            .find(|(_, m)| m.is_match(&upper, &words, description))
            .map(|(r, _)| r.category.as_str())
            .unwrap_or(&self.fallback)
    }

    pub fn apply(&self, txn: Transaction) -> Transaction {
        let category = self.categorize(&txn.description).to_string();
        txn.with_category(category)
    }
}
