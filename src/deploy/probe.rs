// ABOUTME: Connectivity check that must pass before any mutating stage.
// ABOUTME: A ConnectivityProof can only be obtained by running a command successfully.

use super::error::{DeployError, RemoteResultExt, Stage};
use crate::config::{DeploymentTarget, Timeouts};
use crate::remote::{Remote, RemoteCommand};
use crate::ssh::Session;

/// Evidence that the target accepted our key and ran a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityProof {
    _private: (),
}

impl ConnectivityProof {
    /// Run `true` on the host and require exit status 0.
    pub async fn verify(remote: &Remote) -> Result<Self, DeployError> {
        let output = remote
            .run(&RemoteCommand::probe("true"))
            .await
            .during(Stage::Connectivity)?;
        if !output.success() {
            return Err(DeployError::Connectivity(format!(
                "remote command exited with status {}",
                output.exit_code
            )));
        }
        Ok(Self { _private: () })
    }
}

/// Authenticate within the connect timeout.
pub async fn connect(target: &DeploymentTarget, timeouts: &Timeouts) -> Result<Session, DeployError> {
    tracing::info!(
        "Connecting to {}:{} as {}",
        target.host,
        target.port,
        target.user
    );
    Session::connect(target.session_config(timeouts))
        .await
        .map_err(|e| DeployError::Connectivity(e.to_string()))
}
