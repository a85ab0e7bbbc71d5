//! Error types for the Tollgate service.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The identifier has used its quota for the current window
    #[error("Rate limit exceeded for {identifier}, window resets at {reset_at}")]
    RateLimitExceeded {
        identifier: String,
        reset_at: DateTime<Utc>,
    },

    /// A cached value did not decode to the type the caller asked for
    #[error("Cached value for key {key} could not be converted: {source}")]
    CacheDecode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
