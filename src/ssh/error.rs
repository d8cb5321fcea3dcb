// ABOUTME: SSH-specific error types.
// ABOUTME: Connection, authentication, and per-command failures of the target session.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection to {host} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        timeout: std::time::Duration,
    },

    #[error("{user} was not accepted with key {}", key.display())]
    AuthenticationFailed { user: String, key: PathBuf },

    #[error("failed to load key from {}: {reason}", path.display())]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
