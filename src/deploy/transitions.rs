// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use super::Deployment;
use super::error::DeployError;
use super::execute::{DeployMode, DeploymentExecutor};
use super::provision::EnvironmentProvisioner;
use super::proxy::{ProxyConfigurator, ProxySite};
use super::state::{Connected, Proxied, Provisioned, Started, Transferred, Validated};
use super::transfer::{Mirror, transfer};
use super::validate::{DeploymentValidator, HttpProbe};

impl<'a, S> Deployment<'a, S> {
    fn transition<T>(self, state: T) -> Deployment<'a, T> {
        Deployment {
            config: self.config,
            remote: self.remote,
            source: self.source,
            diag: self.diag,
            state,
        }
    }
}

// =============================================================================
// Connected -> Provisioned
// =============================================================================

impl<'a> Deployment<'a, Connected> {
    /// Ensure docker, compose, and nginx are installed and running.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Provisioning` if a mandatory install fails.
    #[must_use = "deployment state must be used"]
    pub async fn provision(mut self) -> Result<Deployment<'a, Provisioned>, DeployError> {
        tracing::info!("Provisioning {}", self.config.target.host);
        let profile = EnvironmentProvisioner::new(self.remote, &self.config.target.user)
            .provision(&mut self.diag)
            .await?;
        if !profile.installed.is_empty() {
            tracing::info!("Installed: {}", profile.installed.join(", "));
        }
        Ok(self.transition(Provisioned { profile }))
    }
}

// =============================================================================
// Provisioned -> Transferred
// =============================================================================

impl<'a> Deployment<'a, Provisioned> {
    /// Mirror the local working tree into the deployment directory.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Transfer` if the directory cannot be prepared or the copy fails.
    #[must_use = "deployment state must be used"]
    pub async fn transfer(
        self,
        mirror: &dyn Mirror,
    ) -> Result<Deployment<'a, Transferred>, DeployError> {
        transfer(self.remote, mirror, &self.source, &self.config.target).await?;
        let profile = self.state.profile.clone();
        Ok(self.transition(Transferred { profile }))
    }
}

// =============================================================================
// Transferred -> Started
// =============================================================================

impl<'a> Deployment<'a, Transferred> {
    /// Start the application in the given mode.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Execution` if building or starting fails.
    #[must_use = "deployment state must be used"]
    pub async fn start(
        mut self,
        mode: Option<DeployMode>,
    ) -> Result<Deployment<'a, Started>, DeployError> {
        if let Some(mode) = mode {
            tracing::info!("Deploy mode: {}", mode);
        }
        let app = DeploymentExecutor::new(self.remote, self.config, self.state.profile.compose)
            .execute(mode, &mut self.diag)
            .await?;
        Ok(self.transition(Started { app }))
    }
}

// =============================================================================
// Started -> Proxied
// =============================================================================

impl<'a> Deployment<'a, Started> {
    /// Point port 80 at the application's loopback port.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::ProxyConfig` if nginx rejects the configuration.
    #[must_use = "deployment state must be used"]
    pub async fn configure_proxy(mut self) -> Result<Deployment<'a, Proxied>, DeployError> {
        let site = ProxySite::new(self.state.app.upstream_port);
        let rule = ProxyConfigurator::new(self.remote)
            .configure(site, &mut self.diag)
            .await?;
        let app = self.state.app.clone();
        Ok(self.transition(Proxied { app, rule }))
    }
}

// =============================================================================
// Proxied -> Validated
// =============================================================================

impl<'a> Deployment<'a, Proxied> {
    /// Run the fatal and advisory post-deploy checks.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Validation` if docker is inactive or nginx config is invalid.
    #[must_use = "deployment state must be used"]
    pub async fn validate(
        mut self,
        probe: HttpProbe,
    ) -> Result<Deployment<'a, Validated>, DeployError> {
        let outcome = DeploymentValidator::new(self.remote, self.config.timeouts.http)
            .with_probe(probe)
            .validate(
                &self.config.target.host,
                self.state.app.upstream_port,
                &mut self.diag,
            )
            .await?;
        let Proxied { app, rule } = self.state.clone();
        Ok(self.transition(Validated { app, rule, outcome }))
    }
}
