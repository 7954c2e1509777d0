/// dbgate Error Module
///
/// This module defines the error taxonomy shared by the gate, the connection
/// manager and the query executor. Variants that reach a caller outside
/// development mode never carry credentials or driver internals.
use std::path::PathBuf;
use thiserror::Error;

/// Comprehensive error type for dbgate.
///
/// This enum covers every failure a caller can observe:
/// - Missing configuration source or missing database settings
/// - Connection establishment failures (policy-filtered)
/// - Statement preparation, binding and execution failures
/// - Gate settings file and log sink I/O
#[derive(Error, Debug)]
pub enum GateError {
    /// No configuration source was found; the process cannot continue safely
    #[error("Configuration source not found: {}", path.display())]
    InitializationMissing { path: PathBuf },

    /// A required database setting is absent or empty
    #[error("Database configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The database rejected or could not establish a session.
    ///
    /// `detail` is only populated in development mode.
    #[error("{}", connection_failure_message(.detail))]
    ConnectionFailure { detail: Option<String> },

    /// Statement preparation, binding or execution errors from the engine
    #[error("Database error: {0}")]
    Statement(#[from] rusqlite::Error),

    /// A named parameter has no matching placeholder in the statement
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// A placeholder in the statement was given no value
    #[error("Unbound parameter: {0}")]
    UnboundParameter(String),

    /// Gate settings file loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared connection mutex was poisoned by a panicking holder
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

fn connection_failure_message(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!("DB Connection failed: {}", detail),
        None => "Database connection failed. Please check logs.".to_string(),
    }
}

impl GateError {
    /// Whether the process should stop instead of rendering a notice.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GateError::InitializationMissing { .. })
    }
}

/// Type alias for Result to use GateError as the error type.
pub type Result<T> = std::result::Result<T, GateError>;
