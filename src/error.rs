//! # Error Types
//!
//! Custom error types for ESC Bitbang using `thiserror`.
//!
//! The driver hot path (mapping, encoding, transmitting, beeping) never fails.
//! Errors only come from validating untrusted input: raw channel indices,
//! configuration files and the capture log.

use thiserror::Error;

/// Main error type for ESC Bitbang
///
/// Only [`EscError::InvalidChannel`] exists without the `std` feature.
#[derive(Debug, Error)]
pub enum EscError {
    /// Channel index outside 0..=3
    #[error("Invalid ESC channel {0} (must be 0-3)")]
    InvalidChannel(u8),

    /// Configuration errors
    #[cfg(feature = "std")]
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Capture log errors
    #[cfg(feature = "std")]
    #[error("Capture log error: {0}")]
    Capture(String),

    /// I/O errors
    #[cfg(feature = "std")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "std")]
impl From<serde_json::Error> for EscError {
    fn from(err: serde_json::Error) -> Self {
        EscError::Capture(err.to_string())
    }
}

/// Result type alias for ESC Bitbang
pub type Result<T> = core::result::Result<T, EscError>;
