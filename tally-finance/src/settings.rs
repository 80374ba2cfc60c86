//! Serializable pipeline settings and their compilation into an immutable
//! [`PipelineConfig`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tally_ingest::{ConfigError, DEFAULT_BOILERPLATE, LineClassifier, ParserConfig, TransactionParser};
use thiserror::Error;
use tracing::debug;

use crate::category_rules::{CategoryRule, Categorizer, FALLBACK_CATEGORY, default_rules};
use crate::pipeline::PipelineConfig;
use crate::rules_csv::{RuleFileError, load_rules_csv};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    RuleFile(#[from] RuleFileError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Regexes matched against whole trimmed lines, highest priority first
    pub boilerplate: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            boilerplate: DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySettings {
    /// Append the built-in table last
    pub include_defaults: bool,
    pub fallback: String,
    /// `pattern,category[,match]` rows appended after `rules`
    pub rules_file: Option<PathBuf>,
    /// Checked before the CSV file and the built-in table
    pub rules: Vec<CategoryRule>,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            include_defaults: true,
            fallback: FALLBACK_CATEGORY.to_string(),
            rules_file: None,
            rules: Vec::new(),
        }
    }
}

impl CategorySettings {
    /// Effective rule list in priority order.
    pub fn effective_rules(&self) -> Result<Vec<CategoryRule>, RuleFileError> {
        let mut rules = self.rules.clone();
        if let Some(path) = &self.rules_file {
            let from_file = load_rules_csv(path)?;
            debug!(path = %path.display(), rules = from_file.len(), "loaded category rules file");
            rules.extend(from_file);
        }
        if self.include_defaults {
            rules.extend(default_rules());
        }
        Ok(rules)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub parser: ParserConfig,
    pub classifier: ClassifierSettings,
    pub categories: CategorySettings,
}

impl PipelineSettings {
    /// Build every regex and rule table once. The result is read-only.
    pub fn compile(&self) -> Result<PipelineConfig, SettingsError> {
        let classifier = LineClassifier::new(&self.classifier.boilerplate)?;
        let parser = TransactionParser::new(self.parser.clone())?;
        let categorizer =
            Categorizer::new(self.categories.effective_rules()?)?.with_fallback(self.categories.fallback.clone());

        debug!(
            boilerplate = classifier.rule_count(),
            category_rules = categorizer.rules().count(),
            "compiled pipeline configuration"
        );
        Ok(PipelineConfig::new(classifier, parser, categorizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category_rules::MatchKind;
    use std::io::Write;

    #[test]
    fn test_defaults_compile() {
        let cfg = PipelineSettings::default().compile().unwrap();
        assert_eq!(cfg.categorizer().categorize("STARBUCKS"), "Dining");
    }

    #[test]
    fn test_rule_order() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "starbucks,Treats").unwrap();

        let settings = PipelineSettings {
            categories: CategorySettings {
                rules: vec![CategoryRule::new("starbucks reserve", "Splurge", MatchKind::Contains)],
                rules_file: Some(f.path().to_path_buf()),
                ..CategorySettings::default()
            },
            ..PipelineSettings::default()
        };
        let cfg = settings.compile().unwrap();
        assert_eq!(cfg.categorizer().categorize("STARBUCKS RESERVE SEATTLE"), "Splurge");
        assert_eq!(cfg.categorizer().categorize("STARBUCKS #123"), "Treats");
        assert_eq!(cfg.categorizer().categorize("SHELL OIL"), "Gas");
    }

    #[test]
    fn test_without_defaults() {
        let settings = PipelineSettings {
            categories: CategorySettings {
                include_defaults: false,
                fallback: "Misc".to_string(),
                ..CategorySettings::default()
            },
            ..PipelineSettings::default()
        };
        let cfg = settings.compile().unwrap();
        assert_eq!(cfg.categorizer().categorize("STARBUCKS"), "Misc");
    }

    #[test]
    fn test_bad_boilerplate_names_pattern() {
        let settings = PipelineSettings {
            classifier: ClassifierSettings {
                boilerplate: vec!["[oops".to_string()],
            },
            ..PipelineSettings::default()
        };
        let err = settings.compile().unwrap_err();
        assert!(err.to_string().contains("[oops"));
    }
}
