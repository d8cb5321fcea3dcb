// ABOUTME: Runs the deploy and cleanup halves of the pipeline in strict sequence.
// ABOUTME: The interrupt flag is checked between stages as well as before each command.

use super::Deployment;
use super::error::DeployError;
use super::execute::DeployMode;
use super::probe::ConnectivityProof;
use super::deployment::DeployReport;
use super::teardown::{TeardownManager, TeardownReport};
use super::transfer::Mirror;
use super::validate::HttpProbe;
use crate::config::RunConfig;
use crate::diagnostics::Diagnostics;
use crate::output::Output;
use crate::remote::Remote;
use std::path::Path;

/// Mode for a tree that may not exist yet during a dry run.
pub fn detect_mode(source: &Path, dry_run: bool) -> Result<Option<DeployMode>, DeployError> {
    if dry_run && !source.exists() {
        return Ok(None);
    }
    DeployMode::detect(source).map(Some)
}

fn checkpoint(remote: &Remote, next: &str) -> Result<(), DeployError> {
    if remote.interrupt().is_triggered() {
        Err(DeployError::Interrupted(format!("before {next}")))
    } else {
        Ok(())
    }
}

/// Probe, provision, transfer, start, proxy, validate.
pub async fn deploy(
    config: &RunConfig,
    remote: &Remote,
    mirror: &dyn Mirror,
    source: &Path,
    probe: HttpProbe,
    output: &Output,
) -> Result<(DeployReport, Diagnostics), DeployError> {
    checkpoint(remote, "connectivity check")?;
    let proof = ConnectivityProof::verify(remote).await?;
    let mode = detect_mode(source, config.dry_run)?;

    let deployment = Deployment::new(config, remote, source.to_path_buf(), proof);

    checkpoint(remote, "provisioning")?;
    output.progress("  → Provisioning host...");
    let deployment = deployment.provision().await?;

    checkpoint(remote, "transfer")?;
    output.progress(&format!(
        "  → Transferring source to {}...",
        config.target.remote_dir
    ));
    let deployment = deployment.transfer(mirror).await?;

    checkpoint(remote, "start")?;
    match mode {
        Some(mode) => output.progress(&format!("  → Starting application ({mode})...")),
        None => output.progress("  → Starting application..."),
    }
    let deployment = deployment.start(mode).await?;

    checkpoint(remote, "proxy configuration")?;
    output.progress("  → Configuring reverse proxy...");
    let deployment = deployment.configure_proxy().await?;

    checkpoint(remote, "validation")?;
    output.progress("  → Validating...");
    let deployment = deployment.validate(probe).await?;

    Ok(deployment.finish())
}

/// Probe, then remove everything a deploy created.
pub async fn cleanup(
    config: &RunConfig,
    remote: &Remote,
    output: &Output,
) -> Result<(TeardownReport, Diagnostics), DeployError> {
    checkpoint(remote, "connectivity check")?;
    ConnectivityProof::verify(remote).await?;

    checkpoint(remote, "teardown")?;
    output.progress(&format!(
        "  → Removing deployment from {}...",
        config.target.host
    ));
    let mut diag = Diagnostics::default();
    let report = TeardownManager::new(remote, &config.target)
        .teardown(&mut diag)
        .await?;
    Ok((report, diag))
}
