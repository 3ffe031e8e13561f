//! Error types for the validator signer.
//!
//! All errors implement `ResponseError` for Actix-web integration,
//! converting domain errors into appropriate HTTP status codes.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Service error type with structured error responses.
#[derive(Error, Debug)]
pub enum SignerError {
    // Input validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Account errors
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // Locking errors
    #[error("Account {account_id} is locked by another signing request")]
    LockBusy { account_id: String },

    // Slashing protection
    #[error("Slashing protection violation: {0}")]
    SlashingViolation(String),

    // Signing errors
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    // Keystore errors
    #[error("Keystore error: {0}")]
    Keystore(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Authentication errors
    #[error("Unauthorized")]
    Unauthorized,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // TLS errors
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl SignerError {
    /// Get the error code for structured error responses.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidInput(_) => Some("INVALID_INPUT"),
            Self::AccountNotFound(_) => Some("ACCOUNT_NOT_FOUND"),
            Self::LockBusy { .. } => Some("LOCK_BUSY"),
            Self::SlashingViolation(_) => Some("SLASHING_VIOLATION"),
            Self::SigningFailed(_) => Some("SIGNING_FAILED"),
            Self::Keystore(_) => Some("KEYSTORE_ERROR"),
            Self::Storage(_) => Some("STORAGE_ERROR"),
            Self::Unauthorized => Some("UNAUTHORIZED"),
            Self::Serialization(_) => Some("SERIALIZATION_ERROR"),
            Self::Deserialization(_) => Some("DESERIALIZATION_ERROR"),
            Self::TlsConfig(_) => Some("TLS_CONFIG_ERROR"),
            Self::Internal(_) => None, // Don't expose internal error codes
        }
    }

    /// Whether the caller may resubmit the same request and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockBusy { .. } | Self::Storage(_))
    }
}

impl ResponseError for SignerError {
    fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request - Client errors
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            Self::Unauthorized => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            Self::AccountNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict - would equivocate against signing history
            Self::SlashingViolation(_) => StatusCode::CONFLICT,

            // 423 Locked - another request holds the account
            Self::LockBusy { .. } => StatusCode::LOCKED,

            // 422 Unprocessable Entity - custody refused to sign
            Self::SigningFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error - Everything else
            Self::Keystore(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::TlsConfig(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code().map(String::from),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

// Conversion from common error types

impl From<std::io::Error> for SignerError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SignerError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

impl From<redb::Error> for SignerError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for SignerError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TableError> for SignerError {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for SignerError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for SignerError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for SignerError {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for signer operations.
pub type SignerResult<T> = Result<T, SignerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            SignerError::InvalidInput("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SignerError::AccountNotFound("abcd".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SignerError::LockBusy {
                account_id: "a".to_string()
            }
            .status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            SignerError::SlashingViolation("double vote".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            SignerError::Storage("disk".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SignerError::AccountNotFound("test".to_string()).error_code(),
            Some("ACCOUNT_NOT_FOUND")
        );
        assert_eq!(SignerError::Internal("test".to_string()).error_code(), None);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(
            SignerError::LockBusy {
                account_id: "a".to_string()
            }
            .is_retryable()
        );
        assert!(!SignerError::SlashingViolation("x".to_string()).is_retryable());
        assert!(!SignerError::InvalidInput("x".to_string()).is_retryable());
    }
}
