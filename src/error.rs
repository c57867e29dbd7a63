//! Error types for the Routeguard service.
//!
//! Rate limit decisions themselves never fail; these errors cover loading
//! configuration and running the HTTP surface.

use thiserror::Error;

/// Main error type for Routeguard operations.
#[derive(Error, Debug)]
pub enum RouteguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid route policy
    #[error("Invalid policy for route '{route}': {reason}")]
    Policy { route: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Routeguard operations.
pub type Result<T> = std::result::Result<T, RouteguardError>;
