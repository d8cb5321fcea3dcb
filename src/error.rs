// ABOUTME: Application-wide error types for dockhand.
// ABOUTME: Each variant maps to a distinct process exit code.

use crate::deploy::{DeployError, DeployErrorKind};
use crate::source::{SourceError, SourceErrorKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("SSH key not found: {}", .0.display())]
    MissingKey(PathBuf),

    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const INTERNAL: i32 = 1;
    pub const INPUT: i32 = 2;
    pub const MISSING_CREDENTIALS: i32 = 3;
    pub const MISSING_KEY: i32 = 4;
    pub const MISSING_MANIFEST: i32 = 5;
    pub const CONNECTIVITY: i32 = 6;
    pub const SOURCE: i32 = 7;
    pub const PROVISIONING: i32 = 8;
    pub const TRANSFER: i32 = 9;
    pub const EXECUTION: i32 = 10;
    pub const PROXY: i32 = 11;
    pub const VALIDATION: i32 = 12;
    pub const INTERRUPTED: i32 = 130;
}

impl Error {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Input(_) | Error::ConfigNotFound(_) | Error::Yaml(_) => exit::INPUT,
            Error::MissingCredentials(_) | Error::MissingEnvVar(_) => exit::MISSING_CREDENTIALS,
            Error::MissingKey(_) => exit::MISSING_KEY,
            Error::Source(e) => match e.kind() {
                SourceErrorKind::Interrupted => exit::INTERRUPTED,
                SourceErrorKind::SecretIo | SourceErrorKind::Sync => exit::SOURCE,
            },
            Error::Deploy(e) => match e.kind() {
                DeployErrorKind::MissingManifest => exit::MISSING_MANIFEST,
                DeployErrorKind::Connectivity => exit::CONNECTIVITY,
                DeployErrorKind::Provisioning => exit::PROVISIONING,
                DeployErrorKind::Transfer => exit::TRANSFER,
                DeployErrorKind::Execution => exit::EXECUTION,
                DeployErrorKind::ProxyConfig => exit::PROXY,
                DeployErrorKind::Validation => exit::VALIDATION,
                DeployErrorKind::Interrupted => exit::INTERRUPTED,
            },
            Error::Interrupted => exit::INTERRUPTED,
            Error::Io(_) => exit::INTERNAL,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.exit_code() == exit::INTERRUPTED
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_exit_two() {
        assert_eq!(Error::Input("bad".into()).exit_code(), 2);
        assert_eq!(
            Error::ConfigNotFound(PathBuf::from("dockhand.yml")).exit_code(),
            2
        );
    }

    #[test]
    fn precondition_errors_have_distinct_codes() {
        assert_eq!(Error::MissingCredentials("x".into()).exit_code(), 3);
        assert_eq!(Error::MissingKey(PathBuf::from("/k")).exit_code(), 4);
        assert_eq!(Error::Interrupted.exit_code(), 130);
    }

    #[test]
    fn source_errors_map_by_kind() {
        let err = Error::from(SourceError::Interrupted);
        assert_eq!(err.exit_code(), 130);
        let err = Error::from(SourceError::Git {
            action: "clone".into(),
            detail: "not found".into(),
        });
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn deploy_errors_map_by_kind() {
        assert_eq!(Error::from(DeployError::MissingManifest).exit_code(), 5);
        assert_eq!(
            Error::from(DeployError::ProxyConfig("nginx -t failed".into())).exit_code(),
            11
        );
        assert!(Error::from(DeployError::Interrupted("x".into())).is_interrupted());
    }
}
