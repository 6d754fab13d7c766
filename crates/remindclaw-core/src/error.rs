//! Error type shared across RemindClaw crates.

use thiserror::Error;

/// Errors surfaced by RemindClaw components.
#[derive(Debug, Error)]
pub enum RemindClawError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemindClawError {
    /// True for errors raised by the persistence backend.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, RemindClawError>;
