//! Common error types for CSRA

use thiserror::Error;

/// Common result type for CSRA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the collector and its consumers
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A record with the same id is already stored
    #[error("Duplicate record id: {0}")]
    DuplicateRecord(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
