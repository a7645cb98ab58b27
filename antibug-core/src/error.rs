//! Error types for antibiogram operations

use std::time::Duration;
use thiserror::Error;

/// Filter and request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Subject index {index} out of range for {len} input values")]
    SubjectIndexOutOfRange { index: usize, len: usize },
}

/// Culture record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query failed for {operation}: {reason}")]
    QueryFailed { operation: String, reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Row mapping failed for column {column}: {reason}")]
    RowMapping { column: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache backend errors. A miss is not an error: `get` reports it as `None`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Failed to serialize {entity}: {reason}")]
    Serialization { entity: String, reason: String },

    #[error("Failed to deserialize {entity}: {reason}")]
    Deserialization { entity: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse classification of an [`AntibugError`], as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    Internal,
    Cancelled,
    DeadlineExceeded,
}

/// Master error type for all antibiogram errors.
#[derive(Debug, Clone, Error)]
pub enum AntibugError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error("Operation {operation} cancelled")]
    Cancelled { operation: String },

    #[error("Operation {operation} exceeded deadline after {elapsed:?}")]
    DeadlineExceeded {
        operation: String,
        elapsed: Duration,
    },
}

impl AntibugError {
    /// Shorthand for a missing required field.
    pub fn missing_field(field: impl Into<String>) -> Self {
        ValidationError::RequiredFieldMissing {
            field: field.into(),
        }
        .into()
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AntibugError::Validation(_) => ErrorKind::InvalidArgument,
            AntibugError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            AntibugError::Storage(_) | AntibugError::Cache(_) | AntibugError::Config(_) => {
                ErrorKind::Internal
            }
            AntibugError::Cancelled { .. } => ErrorKind::Cancelled,
            AntibugError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        }
    }
}

/// Result type alias for antibiogram operations.
pub type AntibugResult<T> = Result<T, AntibugError>;

// =============================================================================
// TESTS
// =============================================================================
