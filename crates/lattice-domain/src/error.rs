//! Error types for build domain operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown projection view: {0}")]
    UnknownView(String),

    #[error("Invalid commit payload: {0}")]
    InvalidPayload(String),
}

/// Result type for build domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
