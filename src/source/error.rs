// ABOUTME: Source synchronisation errors with SNAFU pattern.
// ABOUTME: Separates secret-store failures from git failures for exit-code mapping.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    #[snafu(display("credential store {action} failed: {source}"))]
    SecretIo {
        action: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("credential store has mode {mode:o}, expected 600"))]
    SecretPermissions { mode: u32 },

    #[snafu(display("cannot prepare workspace {}: {source}", path.display()))]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to run git: {source}"))]
    Spawn { source: std::io::Error },

    #[snafu(display("git {action} failed: {detail}"))]
    Git { action: String, detail: String },

    #[snafu(display("{} exists but is not a git working tree", path.display()))]
    NotARepository { path: PathBuf },

    #[snafu(display("interrupted during source synchronisation"))]
    Interrupted,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The ephemeral credential store could not be created or erased.
    SecretIo,
    /// Clone, fetch, checkout, or fast-forward failed.
    Sync,
    /// Ctrl-C arrived between git invocations.
    Interrupted,
}

impl SourceError {
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            SourceError::SecretIo { .. } | SourceError::SecretPermissions { .. } => {
                SourceErrorKind::SecretIo
            }
            SourceError::Workspace { .. }
            | SourceError::Spawn { .. }
            | SourceError::Git { .. }
            | SourceError::NotARepository { .. } => SourceErrorKind::Sync,
            SourceError::Interrupted => SourceErrorKind::Interrupted,
        }
    }
}
