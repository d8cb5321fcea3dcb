// ABOUTME: Remote deployment directory path.
// ABOUTME: Must be absolute and at least two levels deep so teardown can never remove a root.

use crate::types::RepoName;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemoteDirError {
    #[error("remote directory must be an absolute path: {0}")]
    NotAbsolute(String),

    #[error("remote directory must not contain '..': {0}")]
    ParentReference(String),

    #[error("remote directory is too shallow to be tool-owned: {0}")]
    TooShallow(String),

    #[error("invalid character in remote directory: {0:?}")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDir(String);

impl RemoteDir {
    pub fn new(value: &str) -> Result<Self, RemoteDirError> {
        if !value.starts_with('/') {
            return Err(RemoteDirError::NotAbsolute(value.to_string()));
        }

        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '/' | '-' | '_' | '.' | '+' | '@') {
                return Err(RemoteDirError::InvalidChar(c));
            }
        }

        let segments: Vec<&str> = value.split('/').filter(|s| !s.is_empty()).collect();
        if segments.iter().any(|s| *s == "..") {
            return Err(RemoteDirError::ParentReference(value.to_string()));
        }
        if segments.iter().filter(|s| **s != ".").count() < 2 {
            return Err(RemoteDirError::TooShallow(value.to_string()));
        }

        Ok(Self(format!("/{}", segments.join("/"))))
    }

    /// Default location: `~<user>/deployments/<repo>`.
    pub fn default_for(user: &str, repo: &RepoName) -> Result<Self, RemoteDirError> {
        let home = if user == "root" {
            "/root".to_string()
        } else {
            format!("/home/{}", user)
        };
        Self::new(&format!("{}/deployments/{}", home, repo))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a relative file name below this directory.
    pub fn join(&self, name: &str) -> String {
        format!("{}/{}", self.0, name)
    }
}

impl fmt::Display for RemoteDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
