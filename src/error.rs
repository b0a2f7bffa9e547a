//! Error types for the Easytrip service.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Easytrip operations.
#[derive(Error, Debug)]
pub enum TripError {
    /// The client exhausted its admission budget
    #[error("too many requests")]
    RateLimited {
        /// Wait until the client's next token
        retry_after: Duration,
    },

    /// Missing or invalid bearer credential
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    /// The resource does not exist or the caller is not a member of its group.
    ///
    /// Both cases share this variant so callers cannot learn whether a group exists.
    #[error("resource not found")]
    NotFound,

    /// The request body could not be decoded
    #[error("malformed request: {0}")]
    BadRequest(String),

    /// Well-formed input that violates a domain rule
    #[error("validation error: {0}")]
    Validation(String),

    /// A uniqueness rule was violated (duplicate vote, member or email)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The per-request deadline elapsed before storage answered
    #[error("request timed out")]
    Timeout,

    /// Internal failures not tied to a specific source type
    #[error("internal error: {0}")]
    Internal(String),

    /// Storage errors
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, caller-visible classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimited,
    Unauthenticated,
    NotFound,
    Validation,
    Conflict,
    Timeout,
    Internal,
}

impl TripError {
    /// Classify this error for the request boundary.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TripError::RateLimited { .. } => ErrorCategory::RateLimited,
            TripError::Unauthenticated(_) => ErrorCategory::Unauthenticated,
            TripError::NotFound => ErrorCategory::NotFound,
            TripError::BadRequest(_) | TripError::Validation(_) => ErrorCategory::Validation,
            TripError::Conflict(_) => ErrorCategory::Conflict,
            TripError::Timeout => ErrorCategory::Timeout,
            TripError::Internal(_)
            | TripError::Storage(_)
            | TripError::Config(_)
            | TripError::Io(_) => ErrorCategory::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Whether a storage error is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Result type alias for Easytrip operations.
pub type Result<T> = std::result::Result<T, TripError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_hides_detail() {
        assert_eq!(TripError::NotFound.to_string(), "resource not found");
        assert_eq!(TripError::NotFound.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_storage_errors_are_internal() {
        let err = TripError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(TripError::Config("x".into()).category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_bad_request_is_validation_category() {
        let err = TripError::BadRequest("expected value".into());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
