use thiserror::Error;

/// Configuration problems that abort a run before any stage starts.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent or blank
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A numeric setting did not parse
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    /// A setting parsed but is outside its allowed range
    #[error("{name} is out of range: {reason}")]
    OutOfRange {
        name: &'static str,
        reason: &'static str,
    },
}
