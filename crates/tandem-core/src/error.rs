//! Error types for tandem.

use thiserror::Error;

/// Result type alias using tandem's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tandem operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Link aggregation for a category failed and was rolled back
    #[error("Aggregation error in category {category_id}: {message}")]
    Aggregation { category_id: i64, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an error raised while rebuilding a category's links.
    pub fn aggregation(category_id: i64, source: impl std::fmt::Display) -> Self {
        Error::Aggregation {
            category_id,
            message: source.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
