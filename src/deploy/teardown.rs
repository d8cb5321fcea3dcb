// ABOUTME: Removes everything a deploy created: stack, container, images, directory, site.
// ABOUTME: Each removal is best-effort; only the final nginx validation can fail the run.

use super::error::{DeployError, RemoteResultExt, Stage};
use super::execute::{
    IMAGE_REPOSITORY, find_remote_manifest, list_image_tags, remove_reserved_container,
};
use super::provision::{ComposeFlavor, has_binary};
use super::proxy::{reload_command, remove_site_files, restore_default_site, test_config};
use crate::config::DeploymentTarget;
use crate::diagnostics::{Diagnostics, Warning};
use crate::remote::{Remote, RemoteCommand, RemoteError};
use serde::Serialize;

/// What teardown removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// `Some` when a compose manifest was found in the deployment directory.
    pub stack_down: Option<bool>,
    pub container_removed: bool,
    pub images_removed: Vec<String>,
    pub directory_removed: bool,
    pub site_removed: bool,
    /// The distribution default site a deploy disabled is linked again.
    pub default_site_restored: bool,
    pub proxy_reloaded: bool,
}

pub struct TeardownManager<'a> {
    remote: &'a Remote,
    target: &'a DeploymentTarget,
}

impl<'a> TeardownManager<'a> {
    pub fn new(remote: &'a Remote, target: &'a DeploymentTarget) -> Self {
        Self { remote, target }
    }

    pub async fn teardown(&self, diag: &mut Diagnostics) -> Result<TeardownReport, DeployError> {
        let mut report = TeardownReport::default();
        let dir = self.target.remote_dir.as_str();

        let dir_exists = best_effort(
            self.remote
                .succeeds(&RemoteCommand::probe("test").args(["-d", dir]))
                .await,
            diag,
            "check deployment directory",
        )?
        .unwrap_or(false);

        if dir_exists {
            report.stack_down = self.stop_stack(dir, diag).await?;
        }

        report.container_removed = best_effort(
            remove_reserved_container(self.remote).await,
            diag,
            "remove container",
        )?
        .unwrap_or(false);

        report.images_removed = self.remove_images(diag).await?;

        if dir_exists {
            let rm = RemoteCommand::new("rm").args(["-rf", dir]).elevated();
            let removed = best_effort(self.remote.succeeds(&rm).await, diag, "remove directory")?;
            report.directory_removed = removed.unwrap_or(false);
            if removed == Some(false) {
                diag.warn(Warning::teardown_step(format!("could not remove {dir}")));
            }
        }

        let removed = best_effort(remove_site_files(self.remote).await, diag, "remove proxy site")?;
        report.site_removed = removed.unwrap_or(false);
        if removed == Some(false) {
            diag.warn(Warning::teardown_step("could not remove the proxy site files"));
        }

        match best_effort(
            restore_default_site(self.remote).await,
            diag,
            "restore default site",
        )?
        .flatten()
        {
            Some(true) => report.default_site_restored = true,
            Some(false) => diag.warn(Warning::teardown_step(
                "the default nginx site could not be re-enabled",
            )),
            None => {}
        }

        report.proxy_reloaded = self.reload_proxy(diag).await?;
        Ok(report)
    }

    async fn stop_stack(
        &self,
        dir: &str,
        diag: &mut Diagnostics,
    ) -> Result<Option<bool>, DeployError> {
        let Some(manifest) =
            best_effort(find_remote_manifest(self.remote, dir).await, diag, "find manifest")?
                .flatten()
        else {
            return Ok(None);
        };

        let Some(flavor) =
            best_effort(ComposeFlavor::detect(self.remote).await, diag, "detect compose")?
                .flatten()
        else {
            diag.warn(Warning::teardown_step(format!(
                "{manifest} present but compose is unavailable; stack left running"
            )));
            return Ok(Some(false));
        };

        let down = flavor
            .command(manifest)
            .args(["down", "--rmi", "local", "--remove-orphans"])
            .current_dir(dir);
        let output = best_effort(self.remote.run(&down).await, diag, "compose down")?;
        match output {
            Some(out) if out.success() => Ok(Some(true)),
            Some(out) => {
                diag.warn(Warning::teardown_step(format!(
                    "compose down failed: {}",
                    out.diagnostic()
                )));
                Ok(Some(false))
            }
            None => Ok(Some(false)),
        }
    }

    async fn remove_images(&self, diag: &mut Diagnostics) -> Result<Vec<String>, DeployError> {
        let tags = best_effort(list_image_tags(self.remote).await, diag, "list images")?
            .unwrap_or_default();

        let mut removed = Vec::new();
        for tag in tags {
            let image = format!("{IMAGE_REPOSITORY}:{tag}");
            let rmi = RemoteCommand::new("docker")
                .args(["rmi", "-f", image.as_str()])
                .elevated();
            match best_effort(self.remote.run(&rmi).await, diag, "remove image")? {
                Some(out) if out.success() => removed.push(image),
                Some(out) => diag.warn(Warning::teardown_step(format!(
                    "could not remove {image}: {}",
                    out.diagnostic()
                ))),
                None => {}
            }
        }
        Ok(removed)
    }

    /// Reload only if what remains still validates.
    async fn reload_proxy(&self, diag: &mut Diagnostics) -> Result<bool, DeployError> {
        if !has_binary(self.remote, "nginx").await.during(Stage::Proxy)? {
            diag.warn(Warning::teardown_step("nginx is not installed; nothing to reload"));
            return Ok(false);
        }

        let check = test_config(self.remote).await.during(Stage::Proxy)?;
        if !check.success() {
            return Err(DeployError::ProxyConfig(format!(
                "remaining nginx configuration is invalid, not reloading: {}",
                check.diagnostic()
            )));
        }

        let output = self
            .remote
            .run(&reload_command())
            .await
            .during(Stage::Proxy)?;
        if !output.success() {
            return Err(DeployError::ProxyConfig(format!(
                "nginx reload failed: {}",
                output.diagnostic()
            )));
        }
        Ok(true)
    }
}

/// Interrupts still abort; transport failures become warnings.
fn best_effort<T>(
    result: Result<T, RemoteError>,
    diag: &mut Diagnostics,
    step: &str,
) -> Result<Option<T>, DeployError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RemoteError::Interrupted(command)) => Err(DeployError::Interrupted(command)),
        Err(e) => {
            diag.warn(Warning::teardown_step(format!("{step}: {e}")));
            Ok(None)
        }
    }
}
