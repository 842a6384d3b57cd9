use crate::store::StoreError;

/// Failures raised while loading or applying rules.
///
/// Each variant is recovered at a different granularity by the engine:
/// configuration errors abort the unit they belong to (the whole document at
/// load time, a single action at execution time), condition and predicate
/// errors skip the rule for the current email, record errors skip the email,
/// and store errors fail the single action that tried to write.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid condition value '{value}': {reason}")]
    InvalidCondition { value: String, reason: String },

    #[error("predicate '{predicate}' is not supported for field '{field}'")]
    UnsupportedPredicate { field: String, predicate: String },

    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RuleError {
    pub fn configuration(message: impl Into<String>) -> Self {
        RuleError::Configuration(message.into())
    }

    /// True when the error concerns the email itself rather than the rule,
    /// meaning no further rule can be evaluated against it.
    pub fn is_record_error(&self) -> bool {
        matches!(self, RuleError::InvalidRecord { .. })
    }
}
