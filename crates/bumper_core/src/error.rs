//! Error types for bumper_core

use thiserror::Error;

/// Errors that can occur in the state bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A renderer's setup callback failed
    #[error("Renderer setup failed: {0}")]
    Setup(String),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bumper_core operations
pub type Result<T> = std::result::Result<T, BridgeError>;
