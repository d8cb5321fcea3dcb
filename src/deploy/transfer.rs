// ABOUTME: Mirrors the local working tree into the remote deployment directory.
// ABOUTME: One-way archive copy over ssh; remote-only files are left in place.

use super::error::{DeployError, RemoteResultExt, Stage};
use crate::config::DeploymentTarget;
use crate::interrupt::{Interrupt, local_command};
use crate::remote::{Remote, RemoteCommand, quote};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;

/// Paths never copied to the host.
pub const EXCLUDES: &[&str] = &[
    ".git",
    "*.log",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "target",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
];

/// Strategy for copying the source tree to the host.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Name of this transfer method (for logging).
    fn name(&self) -> &'static str;

    async fn mirror(&self, local: &Path, target: &DeploymentTarget) -> Result<(), DeployError>;
}

/// Delta transfer with the local `rsync` binary over `ssh`.
#[derive(Debug, Clone)]
pub struct Rsync {
    interrupt: Interrupt,
    dry_run: bool,
}

impl Rsync {
    pub fn new(interrupt: Interrupt) -> Self {
        Self {
            interrupt,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Full argument vector, without the program name.
    pub fn arguments(local: &Path, target: &DeploymentTarget) -> Vec<String> {
        let mut args = vec!["-az".to_string()];
        args.extend(EXCLUDES.iter().map(|e| format!("--exclude={e}")));
        args.push("-e".to_string());
        args.push(ssh_transport(target));
        // Trailing slash copies the contents rather than the directory itself.
        args.push(format!("{}/", local.display()));
        args.push(format!(
            "{}:{}/",
            target.destination(),
            target.remote_dir.as_str()
        ));
        args
    }
}

fn ssh_transport(target: &DeploymentTarget) -> String {
    format!(
        "ssh -i {} -p {} -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
        quote(&target.key_path.to_string_lossy()),
        target.port
    )
}

#[async_trait]
impl Mirror for Rsync {
    fn name(&self) -> &'static str {
        "rsync"
    }

    async fn mirror(&self, local: &Path, target: &DeploymentTarget) -> Result<(), DeployError> {
        let args = Self::arguments(local, target);

        if self.dry_run {
            tracing::info!("would run: rsync {}", args.join(" "));
            return Ok(());
        }
        if self.interrupt.is_triggered() {
            return Err(DeployError::Interrupted("rsync".to_string()));
        }

        tracing::debug!("rsync {}", args.join(" "));
        let output = local_command("rsync")
            .args(&args)
            .output()
            .await
            .map_err(|e| DeployError::Transfer(format!("failed to run rsync: {e}")))?;
        self.check_output(&output)
    }
}

impl Rsync {
    /// A failure that coincides with Ctrl-C is reported as the interrupt.
    fn check_output(&self, output: &Output) -> Result<(), DeployError> {
        if output.status.success() {
            return Ok(());
        }
        if self.interrupt.is_triggered() {
            return Err(DeployError::Interrupted("rsync".to_string()));
        }
        Err(DeployError::Transfer(format!(
            "rsync failed with exit code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Create the deployment directory and hand it to the deploying user.
pub async fn prepare_remote_dir(remote: &Remote, target: &DeploymentTarget) -> Result<(), DeployError> {
    let dir = target.remote_dir.as_str();

    let mkdir = RemoteCommand::new("mkdir").args(["-p", dir]).elevated();
    let output = remote.run(&mkdir).await.during(Stage::Transfer)?;
    if !output.success() {
        return Err(DeployError::Transfer(format!(
            "cannot create {}: {}",
            dir,
            output.diagnostic()
        )));
    }

    let owner = format!("{}:", target.user);
    let chown = RemoteCommand::new("chown").args([owner.as_str(), dir]).elevated();
    let output = remote.run(&chown).await.during(Stage::Transfer)?;
    if !output.success() {
        return Err(DeployError::Transfer(format!(
            "cannot hand {} to {}: {}",
            dir,
            target.user,
            output.diagnostic()
        )));
    }
    Ok(())
}

/// Prepare the directory, then mirror into it.
pub async fn transfer(
    remote: &Remote,
    mirror: &dyn Mirror,
    local: &Path,
    target: &DeploymentTarget,
) -> Result<(), DeployError> {
    prepare_remote_dir(remote, target).await?;
    tracing::info!(
        "Mirroring {} to {}:{} via {}",
        local.display(),
        target.host,
        target.remote_dir,
        mirror.name()
    );
    mirror.mirror(local, target).await
}
