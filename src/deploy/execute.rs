// ABOUTME: Starts the application on the host via compose or a single reserved container.
// ABOUTME: Mode follows the local source tree on every run; nothing about it is persisted.

use super::error::{DeployError, RemoteResultExt, Stage};
use super::provision::ComposeFlavor;
use crate::config::RunConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::remote::{Remote, RemoteCommand, RemoteError};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

/// Reserved name of the single-container deployment.
pub const CONTAINER_NAME: &str = "dockhand-app";
/// Repository for images built by the single-container path.
pub const IMAGE_REPOSITORY: &str = "dockhand-app";
pub const MANAGED_LABEL: &str = "dockhand.managed=true";

/// Compose manifest names, highest priority first.
pub const COMPOSE_MANIFESTS: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];
pub const DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    Compose { manifest: &'static str },
    SingleContainer,
}

impl DeployMode {
    /// Choose the mode from the files present in the local source tree.
    pub fn detect(source: &Path) -> Result<Self, DeployError> {
        if let Some(manifest) = COMPOSE_MANIFESTS
            .into_iter()
            .find(|name| source.join(name).is_file())
        {
            return Ok(DeployMode::Compose { manifest });
        }
        if source.join(DOCKERFILE).is_file() {
            return Ok(DeployMode::SingleContainer);
        }
        Err(DeployError::MissingManifest)
    }
}

impl std::fmt::Display for DeployMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployMode::Compose { manifest } => write!(f, "compose ({manifest})"),
            DeployMode::SingleContainer => write!(f, "single-container"),
        }
    }
}

/// What the executor left running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedApp {
    /// `None` only for a dry run whose source tree does not exist yet.
    pub mode: Option<DeployMode>,
    /// Image built by the single-container path.
    pub image: Option<String>,
    /// Loopback port the proxy forwards to.
    pub upstream_port: u16,
}

/// Timestamp tag, unique per second.
pub fn image_tag(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

pub struct DeploymentExecutor<'a> {
    remote: &'a Remote,
    config: &'a RunConfig,
    compose: Option<ComposeFlavor>,
}

impl<'a> DeploymentExecutor<'a> {
    pub fn new(remote: &'a Remote, config: &'a RunConfig, compose: Option<ComposeFlavor>) -> Self {
        Self {
            remote,
            config,
            compose,
        }
    }

    pub async fn execute(
        &self,
        mode: Option<DeployMode>,
        diag: &mut Diagnostics,
    ) -> Result<StartedApp, DeployError> {
        let app = match mode {
            Some(DeployMode::Compose { manifest }) => {
                self.run_compose(manifest, diag).await?;
                StartedApp {
                    mode,
                    image: None,
                    upstream_port: self.config.app.app_port,
                }
            }
            Some(DeployMode::SingleContainer) => {
                let image = self.run_single(diag).await?;
                StartedApp {
                    mode,
                    image: Some(image),
                    upstream_port: self.config.app.published_port(),
                }
            }
            None => {
                tracing::info!("Deploy mode is decided once the source tree exists");
                StartedApp {
                    mode,
                    image: None,
                    upstream_port: self.config.app.published_port(),
                }
            }
        };

        self.settle().await;
        let healthy = loopback_probe(self.remote, app.upstream_port, self.config.timeouts.http)
            .await
            .during(Stage::Execution)?;
        if !healthy {
            diag.warn(Warning::loopback_probe(format!(
                "application did not answer on 127.0.0.1:{} yet",
                app.upstream_port
            )));
        }
        Ok(app)
    }

    async fn run_compose(&self, manifest: &str, diag: &mut Diagnostics) -> Result<(), DeployError> {
        let flavor = self.compose.ok_or_else(|| {
            DeployError::Execution("compose manifest found but compose is unavailable".to_string())
        })?;
        let dir = self.config.target.remote_dir.as_str();
        tracing::info!("Starting compose stack from {}", manifest);

        // A previous single-container run may still hold the port.
        if remove_reserved_container(self.remote)
            .await
            .during(Stage::Execution)?
        {
            tracing::info!("Removed previous {} container", CONTAINER_NAME);
        }

        let pull = flavor.command(manifest).arg("pull").current_dir(dir);
        let output = self.remote.run(&pull).await.during(Stage::Execution)?;
        if !output.success() {
            diag.warn(Warning::image_pull(format!(
                "compose pull failed, relying on local builds: {}",
                output.diagnostic()
            )));
        }

        let down = flavor
            .command(manifest)
            .args(["down", "--remove-orphans"])
            .current_dir(dir);
        let output = self.remote.run(&down).await.during(Stage::Execution)?;
        if !output.success() {
            diag.warn(Warning::stack_down(format!(
                "compose down failed: {}",
                output.diagnostic()
            )));
        }

        let up = flavor
            .command(manifest)
            .args(["up", "-d", "--build", "--remove-orphans"])
            .current_dir(dir);
        let output = self.remote.run(&up).await.during(Stage::Execution)?;
        if !output.success() {
            return Err(DeployError::Execution(format!(
                "compose up failed: {}",
                output.diagnostic()
            )));
        }
        Ok(())
    }

    async fn run_single(&self, diag: &mut Diagnostics) -> Result<String, DeployError> {
        let dir = self.config.target.remote_dir.as_str();
        let tag = image_tag(Utc::now());
        let image = format!("{IMAGE_REPOSITORY}:{tag}");

        self.stop_stale_stack(diag).await?;

        tracing::info!("Building {}", image);
        let build = RemoteCommand::new("docker")
            .args(["build", "--label", MANAGED_LABEL, "-t", image.as_str(), dir])
            .elevated();
        let output = self.remote.run(&build).await.during(Stage::Execution)?;
        if !output.success() {
            return Err(DeployError::Execution(format!(
                "image build failed: {}",
                output.diagnostic()
            )));
        }

        remove_reserved_container(self.remote)
            .await
            .during(Stage::Execution)?;

        let publish = format!(
            "127.0.0.1:{}:{}",
            self.config.app.published_port(),
            self.config.app.app_port
        );
        let run = RemoteCommand::new("docker")
            .args([
                "run",
                "-d",
                "--name",
                CONTAINER_NAME,
                "--restart",
                "unless-stopped",
                "--label",
                MANAGED_LABEL,
                "-p",
                publish.as_str(),
                image.as_str(),
            ])
            .elevated();
        let output = self.remote.run(&run).await.during(Stage::Execution)?;
        if !output.success() {
            return Err(DeployError::Execution(format!(
                "container start failed: {}",
                output.diagnostic()
            )));
        }

        self.prune_images(&tag, diag).await?;
        Ok(image)
    }

    /// A compose stack from an earlier run may still be up in this directory.
    async fn stop_stale_stack(&self, diag: &mut Diagnostics) -> Result<(), DeployError> {
        let Some(flavor) = self.compose else {
            return Ok(());
        };
        let dir = self.config.target.remote_dir.as_str();
        let Some(manifest) = find_remote_manifest(self.remote, dir)
            .await
            .during(Stage::Execution)?
        else {
            return Ok(());
        };

        let down = flavor
            .command(manifest)
            .args(["down", "--remove-orphans"])
            .current_dir(dir);
        let output = self.remote.run(&down).await.during(Stage::Execution)?;
        if !output.success() {
            diag.warn(Warning::stack_down(format!(
                "could not stop previous compose stack: {}",
                output.diagnostic()
            )));
        }
        Ok(())
    }

    async fn prune_images(&self, keep: &str, diag: &mut Diagnostics) -> Result<(), DeployError> {
        for tag in list_image_tags(self.remote)
            .await
            .during(Stage::Execution)?
        {
            if tag == keep {
                continue;
            }
            let image = format!("{IMAGE_REPOSITORY}:{tag}");
            let rmi = RemoteCommand::new("docker").args(["rmi", image.as_str()]).elevated();
            let output = self.remote.run(&rmi).await.during(Stage::Execution)?;
            if !output.success() {
                diag.warn(Warning::image_prune(format!(
                    "could not remove {}: {}",
                    image,
                    output.diagnostic()
                )));
            }
        }
        Ok(())
    }

    async fn settle(&self) {
        if self.remote.is_dry_run() {
            return;
        }
        let wait = self.config.timeouts.settle;
        if !wait.is_zero() {
            tracing::debug!("Waiting {:?} for the application to settle", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// First compose manifest present in a remote directory.
pub async fn find_remote_manifest(
    remote: &Remote,
    dir: &str,
) -> Result<Option<&'static str>, RemoteError> {
    for manifest in COMPOSE_MANIFESTS {
        let path = format!("{}/{}", dir.trim_end_matches('/'), manifest);
        if remote
            .succeeds(&RemoteCommand::probe("test").args(["-f", path.as_str()]))
            .await?
        {
            return Ok(Some(manifest));
        }
    }
    Ok(None)
}

/// Force-remove the reserved container. Returns whether it existed.
pub async fn remove_reserved_container(remote: &Remote) -> Result<bool, RemoteError> {
    let inspect = RemoteCommand::probe("docker")
        .args(["container", "inspect", "--format", "{{.Id}}", CONTAINER_NAME])
        .elevated();
    let output = remote.run(&inspect).await?;
    if !output.success() || output.stdout.trim().is_empty() {
        return Ok(false);
    }

    let rm = RemoteCommand::new("docker")
        .args(["rm", "-f", CONTAINER_NAME])
        .elevated();
    Ok(remote.succeeds(&rm).await?)
}

/// Tags of every image in the tool's repository.
pub async fn list_image_tags(remote: &Remote) -> Result<Vec<String>, RemoteError> {
    let list = RemoteCommand::probe("docker")
        .args(["images", IMAGE_REPOSITORY, "--format", "{{.Tag}}"])
        .elevated();
    let output = remote.run(&list).await?;
    if !output.success() {
        return Ok(Vec::new());
    }
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "<none>")
        .map(String::from)
        .collect())
}

/// `GET /` on the host's loopback interface. `true` on a non-error response.
pub async fn loopback_probe(remote: &Remote, port: u16, timeout: Duration) -> Result<bool, RemoteError> {
    let url = format!("http://127.0.0.1:{port}/");
    let max_time = timeout.as_secs().max(1).to_string();
    remote
        .succeeds(&RemoteCommand::probe("curl").args([
            "-fsS",
            "-o",
            "/dev/null",
            "--max-time",
            max_time.as_str(),
            url.as_str(),
        ]))
        .await
}
