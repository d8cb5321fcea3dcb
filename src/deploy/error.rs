// ABOUTME: Error types for the remote deployment stages.
// ABOUTME: Each variant identifies the stage that failed so the exit code can name it.

use crate::remote::RemoteError;

/// Errors that abort the deployment or teardown pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Neither a compose manifest nor a Dockerfile in the source tree.
    #[error("no compose manifest or Dockerfile found in the source tree")]
    MissingManifest,

    #[error("connectivity check failed: {0}")]
    Connectivity(String),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("artifact transfer failed: {0}")]
    Transfer(String),

    #[error("deployment execution failed: {0}")]
    Execution(String),

    #[error("proxy configuration failed: {0}")]
    ProxyConfig(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("interrupted: {0}")]
    Interrupted(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    MissingManifest,
    Connectivity,
    Provisioning,
    Transfer,
    Execution,
    ProxyConfig,
    Validation,
    Interrupted,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::MissingManifest => DeployErrorKind::MissingManifest,
            DeployError::Connectivity(_) => DeployErrorKind::Connectivity,
            DeployError::Provisioning(_) => DeployErrorKind::Provisioning,
            DeployError::Transfer(_) => DeployErrorKind::Transfer,
            DeployError::Execution(_) => DeployErrorKind::Execution,
            DeployError::ProxyConfig(_) => DeployErrorKind::ProxyConfig,
            DeployError::Validation(_) => DeployErrorKind::Validation,
            DeployError::Interrupted(_) => DeployErrorKind::Interrupted,
        }
    }
}

/// Pipeline stage, used to attribute transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connectivity,
    Provisioning,
    Transfer,
    Execution,
    Proxy,
    Validation,
}

impl Stage {
    pub fn error(self, message: impl Into<String>) -> DeployError {
        let message = message.into();
        match self {
            Stage::Connectivity => DeployError::Connectivity(message),
            Stage::Provisioning => DeployError::Provisioning(message),
            Stage::Transfer => DeployError::Transfer(message),
            Stage::Execution => DeployError::Execution(message),
            Stage::Proxy => DeployError::ProxyConfig(message),
            Stage::Validation => DeployError::Validation(message),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Connectivity => "connectivity",
            Stage::Provisioning => "provisioning",
            Stage::Transfer => "transfer",
            Stage::Execution => "execution",
            Stage::Proxy => "proxy",
            Stage::Validation => "validation",
        };
        write!(f, "{name}")
    }
}

/// Extension trait attributing remote executor errors to a stage.
pub trait RemoteResultExt<T> {
    fn during(self, stage: Stage) -> Result<T, DeployError>;
}

impl<T> RemoteResultExt<T> for Result<T, RemoteError> {
    fn during(self, stage: Stage) -> Result<T, DeployError> {
        self.map_err(|e| match e {
            RemoteError::Interrupted(command) => DeployError::Interrupted(command),
            other => stage.error(other.to_string()),
        })
    }
}
