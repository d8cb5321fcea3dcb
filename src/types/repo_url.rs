// ABOUTME: Source repository URL restricted to http/https.
// ABOUTME: Derives the repository basename used for local and remote paths.

use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoUrlError {
    #[error("repository URL cannot be empty")]
    Empty,

    #[error("invalid repository URL {value}: {reason}")]
    Invalid { value: String, reason: url::ParseError },

    #[error("repository URL must use http or https: {0}")]
    UnsupportedScheme(String),

    #[error("repository URL has no host: {0}")]
    MissingHost(String),

    #[error("repository URL must not embed credentials")]
    EmbeddedCredentials,

    #[error("repository URL has no repository path: {0}")]
    MissingPath(String),

    #[error("invalid character in repository name: '{0}'")]
    InvalidNameChar(char),
}

/// A repository URL using http or https.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    raw: String,
    url: Url,
}

impl RepoUrl {
    pub fn parse(value: &str) -> Result<Self, RepoUrlError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RepoUrlError::Empty);
        }

        let url = Url::parse(value).map_err(|reason| match reason {
            // scp-like `git@host:org/app.git` has no scheme at all
            url::ParseError::RelativeUrlWithoutBase => {
                RepoUrlError::UnsupportedScheme(value.to_string())
            }
            reason => RepoUrlError::Invalid {
                value: value.to_string(),
                reason,
            },
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RepoUrlError::UnsupportedScheme(value.to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(RepoUrlError::EmbeddedCredentials);
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(RepoUrlError::MissingHost(value.to_string()));
        }

        let url = Self {
            raw: value.to_string(),
            url,
        };

        // Validates the basename as a side effect.
        url.repo_name()?;
        Ok(url)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host including an explicit non-default port.
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Repository basename: last path segment without a `.git` suffix.
    pub fn repo_name(&self) -> Result<RepoName, RepoUrlError> {
        let segment = self
            .url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .unwrap_or_default();
        let name = segment.strip_suffix(".git").unwrap_or(segment);
        if name.is_empty() {
            return Err(RepoUrlError::MissingPath(self.raw.clone()));
        }
        RepoName::new(name)
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Repository basename, safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName(String);

impl RepoName {
    pub fn new(value: &str) -> Result<Self, RepoUrlError> {
        if value.is_empty() || value == "." || value == ".." {
            return Err(RepoUrlError::MissingPath(value.to_string()));
        }
        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.') {
                return Err(RepoUrlError::InvalidNameChar(c));
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
