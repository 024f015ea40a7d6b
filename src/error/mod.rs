//! Error types for configuration, rule validation and registry operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrunerError>;

#[derive(Debug, Error)]
pub enum PrunerError {
    /// Configuration file or environment problems
    #[error("Configuration error: {0}")]
    Config(String),
    /// A rule failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] RuleError),
    /// Registry returned an unexpected response
    #[error("Registry error: {0}")]
    Registry(String),
    /// Transport level failures
    #[error("Network error: {0}")]
    Network(String),
    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A pipeline worker failed outside of the item operation
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Reasons a rule is rejected when it is built from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("repos or labels selector is required")]
    MissingReposOrLabels,
    #[error("one of keep_versions, keep_days, or keep_recent must be specified as an action")]
    ActionMustBeSpecified,
    #[error("both keep_versions and keep_days specified, but are mutually exclusive")]
    MultipleActionVersionsDays,
    #[error("both keep_days and keep_recent specified, but are mutually exclusive")]
    MultipleActionDaysRecent,
    #[error("both keep_versions and keep_recent specified, but are mutually exclusive")]
    MultipleActionRecentVersions,
    #[error("keep_versions must be positive")]
    KeepVersionsMustBePositive,
    #[error("keep_days must be positive")]
    KeepDaysMustBePositive,
    #[error("keep_recent must be positive")]
    KeepRecentMustBePositive,
    #[error("invalid tag pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl From<serde_json::Error> for PrunerError {
    fn from(err: serde_json::Error) -> Self {
        PrunerError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for PrunerError {
    fn from(err: serde_yaml::Error) -> Self {
        PrunerError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for PrunerError {
    fn from(err: reqwest::Error) -> Self {
        PrunerError::Network(err.to_string())
    }
}

impl From<url::ParseError> for PrunerError {
    fn from(err: url::ParseError) -> Self {
        PrunerError::Config(format!("invalid registry URL: {}", err))
    }
}

impl PrunerError {
    /// Configuration and validation errors stop the run before any network I/O.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, PrunerError::Config(_) | PrunerError::Validation(_))
    }
}
