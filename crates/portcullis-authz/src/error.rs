//! Condition error types.

/// Result type alias for condition construction.
pub type Result<T> = std::result::Result<T, ConditionError>;

/// Errors raised while building conditions from configuration.
///
/// These are configuration-time failures; evaluating a built rule set never
/// errors.
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    /// The pattern is not a valid regular expression.
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// An option in the bracketed option list is not recognized.
    #[error("unknown condition option '{0}'")]
    UnknownOption(String),

    /// Options that cannot be combined.
    #[error("conflicting condition options: {0}")]
    ConflictingOptions(String),

    /// Condition without an attribute name.
    #[error("condition has no attribute name")]
    EmptyName,

    /// Require line without any accepted value.
    #[error("require for '{0}' lists no values")]
    EmptyRequire(String),
}
