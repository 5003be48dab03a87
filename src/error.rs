//! Error types for the throttle guard.

use thiserror::Error;

/// Main error type for throttle guard operations.
///
/// Evaluation itself never fails; these errors only surface while the guard
/// is being configured or its background purge is being scheduled.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No async runtime available to host the purge task
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for throttle guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;
