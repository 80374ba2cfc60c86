use thiserror::Error;

/// Rejected configuration, reported at load time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid setting {name}: {details}")]
    InvalidSetting { name: &'static str, details: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
