//! Error types for Taxis.
//!
//! All fallible operations return [`Result`], whose error type is
//! [`TaxisError`]. Lower-level failures (I/O, JSON, binary encoding) are
//! converted automatically through `?`.

use std::io;

use thiserror::Error;

/// The main error type for Taxis operations.
#[derive(Error, Debug)]
pub enum TaxisError {
    /// I/O errors (file operations, directory listing, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors (corrupt segments, missing identifiers)
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Query-related errors (parsing, invalid queries, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Field-related errors raised while describing an entity
    #[error("Field error: {0}")]
    Field(String),

    /// Analysis-related errors (tokenization, filtering, etc.)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Suggestion store errors
    #[error("Suggest error: {0}")]
    Suggest(String),

    /// Errors raised while hydrating hits into entities
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary serialization errors
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with TaxisError.
pub type Result<T> = std::result::Result<T, TaxisError>;

impl TaxisError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        TaxisError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TaxisError::Storage(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        TaxisError::Query(msg.into())
    }

    /// Create a new field error.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        TaxisError::Field(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        TaxisError::Analysis(msg.into())
    }

    /// Create a new suggest error.
    pub fn suggest<S: Into<String>>(msg: S) -> Self {
        TaxisError::Suggest(msg.into())
    }

    /// Create a new fetch error.
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        TaxisError::Fetch(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TaxisError::Config(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        TaxisError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TaxisError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        TaxisError::Storage(format!("Not found: {}", msg.into()))
    }

    /// Whether this error signals a missing file rather than a broken one.
    pub fn is_not_found(&self) -> bool {
        match self {
            TaxisError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            TaxisError::Storage(msg) => msg.starts_with("Not found"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TaxisError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = TaxisError::query("unbalanced parenthesis");
        assert_eq!(error.to_string(), "Query error: unbalanced parenthesis");

        let error = TaxisError::invalid_operation("not an entity");
        assert_eq!(error.to_string(), "Invalid operation: not an entity");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TaxisError::from(io_error);

        match error {
            TaxisError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }
        assert!(TaxisError::not_found("segments.json").is_not_found());
    }
}
