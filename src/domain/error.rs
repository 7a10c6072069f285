//! Domain error taxonomy.
//!
//! A closed set of error kinds, each with a stable machine code. These are
//! the only errors that cross the service boundary; HTTP status mapping
//! happens in `crate::error`.

use uuid::Uuid;

/// Result alias used throughout the services and repositories.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Domain error kinds.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// The requested ledger does not exist for the caller's tenant.
    #[error("Ledger not found: {0}")]
    LedgerNotFound(Uuid),

    /// A domain invariant was violated (unbalanced posting, bad cursor,
    /// ledger/currency mismatch, empty name, ...).
    #[error("{0}")]
    InvariantViolation(String),

    /// Persistence-layer failure. The underlying cause is logged where it
    /// occurs and never exposed to clients.
    #[error("{0}")]
    Repository(String),

    /// Missing or invalid credential.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
}

impl LedgerError {
    /// Stable machine code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LedgerNotFound(_) => "LEDGER_NOT_FOUND",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::Repository(_) => "REPOSITORY_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
        }
    }

    /// Shorthand for an invariant violation with a formatted message.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Shorthand for a repository failure.
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            LedgerError::LedgerNotFound(Uuid::nil()).code(),
            "LEDGER_NOT_FOUND"
        );
        assert_eq!(
            LedgerError::invariant("unbalanced").code(),
            "INVARIANT_VIOLATION"
        );
        assert_eq!(LedgerError::repository("db down").code(), "REPOSITORY_ERROR");
        assert_eq!(
            LedgerError::Unauthorized("Invalid API key").code(),
            "UNAUTHORIZED"
        );
        assert_eq!(
            LedgerError::Forbidden("ADMIN role required".into()).code(),
            "FORBIDDEN"
        );
    }

    #[test]
    fn test_ledger_not_found_message_includes_id() {
        let id = Uuid::new_v4();
        let err = LedgerError::LedgerNotFound(id);
        assert_eq!(err.to_string(), format!("Ledger not found: {id}"));
    }

    #[test]
    fn test_invariant_message_passthrough() {
        let err = LedgerError::invariant("debits and credits must balance");
        assert_eq!(err.to_string(), "debits and credits must balance");
    }
}
