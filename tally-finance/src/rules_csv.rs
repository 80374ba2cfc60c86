//! Load extra category rules from a CSV file.
//!
//! Rows are `pattern,category[,match]`. A leading header row (first field
//! "pattern") is skipped, as are blank rows and `#` comments.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::category_rules::{CategoryRule, MatchKind};

#[derive(Error, Debug)]
pub enum RuleFileError {
    #[error("reading rules file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("rules CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("rules CSV row {row}: {details}")]
    BadRow { row: usize, details: String },
}

pub fn load_rules_csv(path: impl AsRef<Path>) -> Result<Vec<CategoryRule>, RuleFileError> {
    let path = path.as_ref();
    let rdr = reader_builder()
        .from_path(path)
        .map_err(|source| RuleFileError::Open {
            path: path.display().to_string(),
            source,
        })?;
    read_rules(rdr)
}

pub fn parse_rules_csv(input: impl Read) -> Result<Vec<CategoryRule>, RuleFileError> {
    read_rules(reader_builder().from_reader(input))
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    b.flexible(true)
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All);
    b
}

fn read_rules<R: Read>(mut rdr: csv::Reader<R>) -> Result<Vec<CategoryRule>, RuleFileError> {
    let mut rules = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let row = i + 1;

        let pattern = record.get(0).unwrap_or("");
        if row == 1 && pattern.eq_ignore_ascii_case("pattern") {
            continue;
        }
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let category = record.get(1).unwrap_or("");
        if pattern.is_empty() || category.is_empty() {
            return Err(RuleFileError::BadRow {
                row,
                details: "pattern and category are both required".to_string(),
            });
        }

        let raw_kind = record.get(2).unwrap_or("");
        let match_kind = MatchKind::parse(raw_kind).ok_or_else(|| RuleFileError::BadRow {
            row,
            details: format!("unknown match kind '{raw_kind}'"),
        })?;

        rules.push(CategoryRule::new(pattern, category, match_kind));
    }

    Ok(rules)
}
