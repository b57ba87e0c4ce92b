//! Error types for Docket
//!
//! One enum covers the store, migration and lifecycle failure classes so the
//! migration binary and the REST helpers can both report them.

use hyper::StatusCode;
use mongodb::error::{ErrorKind, WriteFailure};

/// Duplicate key error code returned by MongoDB
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Main error type for Docket operations
#[derive(Debug, thiserror::Error)]
pub enum DocketError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Constraint violation on {collection}.{index}: {message}")]
    ConstraintViolation {
        collection: String,
        index: String,
        message: String,
    },

    #[error("Cannot {action} an application in status '{status}': {reason}")]
    InvalidTransition {
        status: String,
        action: String,
        reason: String,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocketError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConstraintViolation { .. } => StatusCode::CONFLICT,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }

    /// Build an invalid-transition error
    pub fn invalid_transition(
        status: impl ToString,
        action: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            status: status.to_string(),
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach collection/index context to a store error raised while building an index
    pub fn for_index(self, collection: &str, index: &str) -> Self {
        match self {
            Self::ConstraintViolation { message, .. } => Self::ConstraintViolation {
                collection: collection.to_string(),
                index: index.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// Check whether a driver error is a duplicate key violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY_CODE,
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

// Implement From conversions for common error types

impl From<mongodb::error::Error> for DocketError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return Self::ConstraintViolation {
                collection: String::new(),
                index: String::new(),
                message: err.to_string(),
            };
        }
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
                Self::Connection(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DocketError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<bson::ser::Error> for DocketError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for DocketError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON decode error: {}", err))
    }
}

/// Result type alias for Docket operations
pub type Result<T> = std::result::Result<T, DocketError>;
