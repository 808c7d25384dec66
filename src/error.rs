//! Error types for dnsfilter.

use thiserror::Error;

/// Error type for dnsfilter operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading a rule list or config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A line of a rule list could not be parsed
    #[error("rule list {list_id}, line {line}: {source}")]
    RuleParse {
        list_id: i64,
        line: usize,
        #[source]
        source: RuleError,
    },

    /// A standalone rule could not be parsed
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] RuleError),

    /// Invalid rewrite entry
    #[error("invalid rewrite entry: {0}")]
    InvalidRewrite(String),

    /// An external classifier failed
    #[error("{name} lookup failed: {reason}")]
    Classifier { name: &'static str, reason: String },

    /// The filter has been closed
    #[error("filter is closed")]
    Closed,
}

/// Result type alias for dnsfilter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rule text parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Empty pattern
    #[error("empty rule pattern")]
    EmptyPattern,

    /// Pattern contains characters that cannot appear in a hostname pattern
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Unknown or unsupported `$modifier`
    #[error("unsupported modifier: {0}")]
    UnsupportedModifier(String),

    /// Regex pattern failed to compile
    #[error("invalid regex {pattern}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// Host rule without hostnames
    #[error("host rule has no hostnames: {0}")]
    MissingHostname(String),

    /// Host rule hostname is malformed
    #[error("invalid hostname in host rule: {0}")]
    InvalidHostname(String),
}

impl Error {
    /// Wrap a rule error with the position it was found at.
    pub(crate) fn at(list_id: i64, line: usize, source: RuleError) -> Self {
        Error::RuleParse {
            list_id,
            line,
            source,
        }
    }
}
