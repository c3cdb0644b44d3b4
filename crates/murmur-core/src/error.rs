//! Unified error types for Murmur

use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Murmur operations
#[derive(Error, Debug)]
pub enum MurmurError {
    // Upstream failures (transient, retried)
    #[error("Content generation failed: {0}")]
    Generation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Circuit breaker
    #[error("Circuit breaker '{breaker}' is open, retry after {}s", retry_after.as_secs())]
    CircuitOpen {
        breaker: String,
        retry_after: Duration,
    },

    // Validation errors
    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("Validation failed: {0}")]
    Validation(String),

    // Publishing
    #[error("Failed to publish after {attempts} attempts: {last_error}")]
    PublishExhausted {
        attempts: u32,
        #[source]
        last_error: Box<MurmurError>,
    },

    // Inbound message handling
    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid posting interval: {0}")]
    InvalidInterval(String),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl MurmurError {
    /// True for the fast-fail rejection issued by an open circuit.
    ///
    /// Retry logic must check this before treating an error as an upstream failure.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, MurmurError::CircuitOpen { .. })
    }

    /// True for failures of an upstream service that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MurmurError::Generation(_) | MurmurError::Transport(_) | MurmurError::Http(_)
        )
    }
}

/// Result type alias using MurmurError
pub type Result<T> = std::result::Result<T, MurmurError>;
