//! # Error Types
//!
//! Custom error types for the minidrone crate using `thiserror`.

use thiserror::Error;

use crate::engine::types::Accessory;

/// Main error type for minidrone
#[derive(Debug, Error)]
pub enum MinidroneError {
    /// Frame or command encoding errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte transport refused a write
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation requested before the connection handshake completed
    #[error("drone not connected")]
    NotConnected,

    /// The link went down while waiting for a result
    #[error("drone disconnected")]
    Disconnected,

    /// Another operation is still in flight
    #[error("another operation is in progress")]
    Busy,

    /// Bounded wait expired
    #[error("operation timed out")]
    Timeout,

    /// Battery below the floor required by the operation (flip)
    #[error("battery level too low for this operation")]
    LowBattery,

    /// Accessory operation with no known accessory id
    #[error("{0} accessory is not attached")]
    AccessoryMissing(Accessory),
}

/// Result type alias for minidrone
pub type Result<T> = std::result::Result<T, MinidroneError>;
