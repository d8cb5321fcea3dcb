// ABOUTME: Brings the target host to a known baseline: docker, compose, and nginx.
// ABOUTME: Install-if-absent per package family; enablement steps only warn on failure.

use super::error::{DeployError, RemoteResultExt, Stage};
use crate::diagnostics::{Diagnostics, Warning};
use crate::remote::{Remote, RemoteCommand, RemoteError};

/// Pinned release used when compose is unavailable from the package manager.
pub const COMPOSE_VERSION: &str = "v2.27.0";
pub const COMPOSE_STANDALONE_PATH: &str = "/usr/local/bin/docker-compose";

const DOCKER_GROUP: &str = "docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedHatTool {
    Dnf,
    Yum,
}

/// Package manager family detected on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Debian,
    RedHat(RedHatTool),
    Unknown,
}

/// Something the host must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    ContainerRuntime,
    Compose,
    Proxy,
}

impl Component {
    fn binary(self) -> &'static str {
        match self {
            Component::ContainerRuntime => "docker",
            Component::Compose => "docker-compose",
            Component::Proxy => "nginx",
        }
    }
}

impl PackageFamily {
    /// Probe apt-get, then dnf, then yum.
    pub async fn detect(remote: &Remote) -> Result<Self, DeployError> {
        if has_binary(remote, "apt-get").await.during(Stage::Provisioning)? {
            Ok(PackageFamily::Debian)
        } else if has_binary(remote, "dnf").await.during(Stage::Provisioning)? {
            Ok(PackageFamily::RedHat(RedHatTool::Dnf))
        } else if has_binary(remote, "yum").await.during(Stage::Provisioning)? {
            Ok(PackageFamily::RedHat(RedHatTool::Yum))
        } else {
            Ok(PackageFamily::Unknown)
        }
    }

    pub fn manager(self) -> Option<&'static str> {
        match self {
            PackageFamily::Debian => Some("apt-get"),
            PackageFamily::RedHat(RedHatTool::Dnf) => Some("dnf"),
            PackageFamily::RedHat(RedHatTool::Yum) => Some("yum"),
            PackageFamily::Unknown => None,
        }
    }

    /// Package providing a component in this family.
    pub fn package(self, component: Component) -> Option<&'static str> {
        match (self, component) {
            (PackageFamily::Unknown, _) => None,
            (PackageFamily::Debian, Component::ContainerRuntime) => Some("docker.io"),
            (PackageFamily::RedHat(_), Component::ContainerRuntime) => Some("docker"),
            (_, Component::Compose) => Some("docker-compose-plugin"),
            (_, Component::Proxy) => Some("nginx"),
        }
    }

    fn refresh_command(self) -> Option<RemoteCommand> {
        match self {
            PackageFamily::Debian => Some(
                RemoteCommand::new("apt-get")
                    .env("DEBIAN_FRONTEND", "noninteractive")
                    .args(["update", "-q"])
                    .elevated(),
            ),
            PackageFamily::RedHat(_) => self
                .manager()
                .map(|m| RemoteCommand::new(m).args(["makecache", "-q"]).elevated()),
            PackageFamily::Unknown => None,
        }
    }

    fn install_command(self, package: &str) -> Option<RemoteCommand> {
        match self {
            PackageFamily::Debian => Some(
                RemoteCommand::new("apt-get")
                    .env("DEBIAN_FRONTEND", "noninteractive")
                    .args(["install", "-y", "-q", package])
                    .elevated(),
            ),
            PackageFamily::RedHat(_) => self
                .manager()
                .map(|m| RemoteCommand::new(m).args(["install", "-y", "-q", package]).elevated()),
            PackageFamily::Unknown => None,
        }
    }
}

impl std::fmt::Display for PackageFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageFamily::Debian => write!(f, "debian-like"),
            PackageFamily::RedHat(_) => write!(f, "redhat-like"),
            PackageFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// How compose is invoked on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose`
    Plugin,
    /// `docker-compose`
    Standalone,
}

impl ComposeFlavor {
    pub async fn detect(remote: &Remote) -> Result<Option<Self>, RemoteError> {
        let plugin = RemoteCommand::probe("docker")
            .args(["compose", "version"])
            .elevated();
        if remote.succeeds(&plugin).await? {
            return Ok(Some(ComposeFlavor::Plugin));
        }
        let standalone = RemoteCommand::probe("docker-compose")
            .arg("version")
            .elevated();
        if remote.succeeds(&standalone).await? {
            return Ok(Some(ComposeFlavor::Standalone));
        }
        Ok(None)
    }

    /// Base command for a manifest; callers append the subcommand.
    pub fn command(self, manifest: &str) -> RemoteCommand {
        let base = match self {
            ComposeFlavor::Plugin => RemoteCommand::new("docker").arg("compose"),
            ComposeFlavor::Standalone => RemoteCommand::new(Component::Compose.binary()),
        };
        base.args(["-f", manifest]).elevated()
    }
}

/// What the host provides after provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProfile {
    pub family: PackageFamily,
    pub container_runtime: bool,
    pub compose: Option<ComposeFlavor>,
    pub proxy: bool,
    /// Packages or binaries installed by this run.
    pub installed: Vec<String>,
}

pub struct EnvironmentProvisioner<'a> {
    remote: &'a Remote,
    user: &'a str,
}

impl<'a> EnvironmentProvisioner<'a> {
    pub fn new(remote: &'a Remote, user: &'a str) -> Self {
        Self { remote, user }
    }

    pub async fn provision(&self, diag: &mut Diagnostics) -> Result<RuntimeProfile, DeployError> {
        let family = PackageFamily::detect(self.remote).await?;
        tracing::info!("Package family: {}", family);
        if family == PackageFamily::Unknown {
            diag.warn(Warning::unknown_package_manager(
                "no supported package manager found (apt-get, dnf, yum); skipping package installs",
            ));
        }

        let mut installer = Installer {
            remote: self.remote,
            family,
            refreshed: false,
            installed: Vec::new(),
        };

        for component in [Component::ContainerRuntime, Component::Proxy] {
            if !has_binary(self.remote, component.binary())
                .await
                .during(Stage::Provisioning)?
            {
                installer.install(component, diag).await?;
            }
        }

        let compose = match ComposeFlavor::detect(self.remote)
            .await
            .during(Stage::Provisioning)?
        {
            Some(flavor) => flavor,
            None => installer.install_compose(diag).await?,
        };

        self.ensure_group_membership(diag).await?;
        for service in ["docker", "nginx"] {
            self.enable_service(service, diag).await?;
        }

        Ok(RuntimeProfile {
            family,
            container_runtime: true,
            compose: Some(compose),
            proxy: true,
            installed: installer.installed,
        })
    }

    async fn ensure_group_membership(&self, diag: &mut Diagnostics) -> Result<(), DeployError> {
        if self.user == "root" {
            return Ok(());
        }

        let groups = self
            .remote
            .run(&RemoteCommand::probe("id").args(["-nG", self.user]))
            .await
            .during(Stage::Provisioning)?;
        if groups.success() && groups.stdout.split_whitespace().any(|g| g == DOCKER_GROUP) {
            return Ok(());
        }

        let output = self
            .remote
            .run(
                &RemoteCommand::new("usermod")
                    .args(["-aG", DOCKER_GROUP, self.user])
                    .elevated(),
            )
            .await
            .during(Stage::Provisioning)?;
        if !output.success() {
            diag.warn(Warning::group_membership(format!(
                "could not add {} to the {} group: {}",
                self.user,
                DOCKER_GROUP,
                output.diagnostic()
            )));
        }
        Ok(())
    }

    async fn enable_service(&self, service: &str, diag: &mut Diagnostics) -> Result<(), DeployError> {
        let output = self
            .remote
            .run(
                &RemoteCommand::new("systemctl")
                    .args(["enable", "--now", service])
                    .elevated(),
            )
            .await
            .during(Stage::Provisioning)?;
        if !output.success() {
            diag.warn(Warning::service_enable(format!(
                "could not enable {}: {}",
                service,
                output.diagnostic()
            )));
        }
        Ok(())
    }
}

struct Installer<'a> {
    remote: &'a Remote,
    family: PackageFamily,
    refreshed: bool,
    installed: Vec<String>,
}

impl Installer<'_> {
    async fn refresh(&mut self, diag: &mut Diagnostics) -> Result<(), DeployError> {
        if self.refreshed {
            return Ok(());
        }
        self.refreshed = true;
        if let Some(cmd) = self.family.refresh_command() {
            let output = self.remote.run(&cmd).await.during(Stage::Provisioning)?;
            if !output.success() {
                diag.warn(Warning::package_index(format!(
                    "package index refresh failed: {}",
                    output.diagnostic()
                )));
            }
        }
        Ok(())
    }

    /// Install a mandatory component. Failure is fatal.
    async fn install(&mut self, component: Component, diag: &mut Diagnostics) -> Result<(), DeployError> {
        let binary = component.binary();
        let package = self.family.package(component).ok_or_else(|| {
            DeployError::Provisioning(format!(
                "{binary} is not installed and no supported package manager was found"
            ))
        })?;

        self.refresh(diag).await?;
        tracing::info!("Installing {}", package);
        if !self.try_install(package).await? {
            return Err(DeployError::Provisioning(format!(
                "failed to install {package}"
            )));
        }
        if !self.remote.is_dry_run()
            && !has_binary(self.remote, binary)
                .await
                .during(Stage::Provisioning)?
        {
            return Err(DeployError::Provisioning(format!(
                "{package} installed but {binary} is still unavailable"
            )));
        }
        self.installed.push(package.to_string());
        Ok(())
    }

    async fn try_install(&self, package: &str) -> Result<bool, DeployError> {
        let Some(cmd) = self.family.install_command(package) else {
            return Ok(false);
        };
        let output = self.remote.run(&cmd).await.during(Stage::Provisioning)?;
        if !output.success() {
            tracing::debug!("install {} failed: {}", package, output.diagnostic());
        }
        Ok(output.success())
    }

    /// Package plugin first, then the pinned standalone binary.
    async fn install_compose(&mut self, diag: &mut Diagnostics) -> Result<ComposeFlavor, DeployError> {
        if let Some(package) = self.family.package(Component::Compose) {
            self.refresh(diag).await?;
            if self.try_install(package).await? {
                let detected = ComposeFlavor::detect(self.remote)
                    .await
                    .during(Stage::Provisioning)?;
                if let Some(flavor) = detected {
                    self.installed.push(package.to_string());
                    return Ok(flavor);
                }
            }
            tracing::info!("{} unavailable, falling back to standalone compose", package);
        }

        let arch = self
            .remote
            .run(&RemoteCommand::probe("uname").arg("-m"))
            .await
            .during(Stage::Provisioning)?;
        let asset = compose_asset(arch.stdout.trim()).ok_or_else(|| {
            DeployError::Provisioning(format!(
                "no standalone compose build for architecture {:?}",
                arch.stdout.trim()
            ))
        })?;
        let url = format!(
            "https://github.com/docker/compose/releases/download/{COMPOSE_VERSION}/{asset}"
        );

        let download = RemoteCommand::new("curl")
            .args(["-fsSL", "-o", COMPOSE_STANDALONE_PATH, url.as_str()])
            .elevated();
        let output = self.remote.run(&download).await.during(Stage::Provisioning)?;
        if !output.success() {
            return Err(DeployError::Provisioning(format!(
                "failed to download compose {}: {}",
                COMPOSE_VERSION,
                output.diagnostic()
            )));
        }
        let chmod = RemoteCommand::new("chmod")
            .args(["0755", COMPOSE_STANDALONE_PATH])
            .elevated();
        let output = self.remote.run(&chmod).await.during(Stage::Provisioning)?;
        if !output.success() {
            return Err(DeployError::Provisioning(format!(
                "failed to make {} executable: {}",
                COMPOSE_STANDALONE_PATH,
                output.diagnostic()
            )));
        }

        self.installed
            .push(format!("docker-compose {COMPOSE_VERSION}"));
        if self.remote.is_dry_run() {
            return Ok(ComposeFlavor::Standalone);
        }
        ComposeFlavor::detect(self.remote)
            .await
            .during(Stage::Provisioning)?
            .ok_or_else(|| {
                DeployError::Provisioning("compose is still unavailable after install".to_string())
            })
    }
}

/// Release asset name for `uname -m`.
pub fn compose_asset(arch: &str) -> Option<String> {
    let arch = match arch {
        "x86_64" | "amd64" => "x86_64",
        "aarch64" | "arm64" => "aarch64",
        "armv7l" | "armv7" => "armv7",
        "armv6l" | "armv6" => "armv6",
        "ppc64le" => "ppc64le",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        _ => return None,
    };
    Some(format!("docker-compose-linux-{arch}"))
}

/// `command -v` through `sh -c` with the name passed as a positional argument.
/// Runs under sudo: a non-root login PATH on debian-like hosts has no
/// /usr/sbin, where nginx lives.
pub(crate) async fn has_binary(remote: &Remote, name: &str) -> Result<bool, RemoteError> {
    remote
        .succeeds(
            &RemoteCommand::probe("sh")
                .args(["-c", "command -v \"$1\"", "sh", name])
                .elevated(),
        )
        .await
}
