// ABOUTME: Git branch name validation.
// ABOUTME: Accepts the subset of ref names that is safe to pass to git and to log.

use std::fmt;
use thiserror::Error;

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BranchNameError {
    #[error("branch name cannot be empty")]
    Empty,

    #[error("branch name cannot start with '-' or '/'")]
    InvalidStart,

    #[error("branch name cannot end with '/', '.' or '.lock'")]
    InvalidEnd,

    #[error("branch name cannot contain '..' or '//'")]
    InvalidSequence,

    #[error("invalid character in branch name: {0:?}")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchName(String);

impl BranchName {
    pub fn new(value: &str) -> Result<Self, BranchNameError> {
        if value.is_empty() {
            return Err(BranchNameError::Empty);
        }
        if value.starts_with('-') || value.starts_with('/') {
            return Err(BranchNameError::InvalidStart);
        }
        if value.ends_with('/') || value.ends_with('.') || value.ends_with(".lock") {
            return Err(BranchNameError::InvalidEnd);
        }
        if value.contains("..") || value.contains("//") || value.contains("@{") {
            return Err(BranchNameError::InvalidSequence);
        }
        for c in value.chars() {
            if c.is_control() || c.is_whitespace() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')
            {
                return Err(BranchNameError::InvalidChar(c));
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BranchName {
    fn default() -> Self {
        Self(DEFAULT_BRANCH.to_string())
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
