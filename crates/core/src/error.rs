//! Domain error model.

use thiserror::Error;

/// Rejected input: a value or identifier that does not parse or validate.
///
/// Missing records, conflicts and access failures belong to the store and
/// guard layers, which carry their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        assert_eq!(
            DomainError::validation("password too short").to_string(),
            "validation failed: password too short"
        );
        assert_eq!(
            DomainError::invalid_id("UserId: bad length").to_string(),
            "invalid identifier: UserId: bad length"
        );
    }
}
