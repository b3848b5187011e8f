//! Common error types for Measure Master

use thiserror::Error;

/// Common result type for Measure Master operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Measure Master crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema maintenance failure that cannot be degraded around
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
