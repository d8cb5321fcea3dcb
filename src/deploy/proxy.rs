// ABOUTME: Writes and activates the tool-owned nginx site forwarding port 80 to loopback.
// ABOUTME: Reloads only after `nginx -t` passes; a failing site is removed again.

use super::error::{DeployError, RemoteResultExt, Stage};
use crate::diagnostics::{Diagnostics, Warning};
use crate::remote::{Remote, RemoteCommand, RemoteError};

/// Fixed identifier of the site; create overwrites and teardown deletes by it.
pub const SITE_NAME: &str = "dockhand";

const SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
const SITES_ENABLED: &str = "/etc/nginx/sites-enabled";
const CONF_D: &str = "/etc/nginx/conf.d";

/// Exists while the distribution's default site is disabled by a deploy.
/// Holds the link target to restore. nginx never includes this path.
pub const DEFAULT_SITE_MARKER: &str = "/etc/nginx/.dockhand-default-disabled";

/// Where nginx on this host looks for site definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyLayout {
    /// `sites-available` plus a link in `sites-enabled` (debian-like).
    SitesDirs,
    /// A single file in `conf.d`.
    ConfD,
}

impl ProxyLayout {
    pub async fn detect(remote: &Remote) -> Result<Self, RemoteError> {
        let probe = RemoteCommand::probe("test").args(["-d", SITES_AVAILABLE]);
        if remote.succeeds(&probe).await? {
            Ok(ProxyLayout::SitesDirs)
        } else {
            Ok(ProxyLayout::ConfD)
        }
    }

    /// Path the definition is written to.
    pub fn available_path(self) -> String {
        match self {
            ProxyLayout::SitesDirs => format!("{SITES_AVAILABLE}/{SITE_NAME}"),
            ProxyLayout::ConfD => format!("{CONF_D}/{SITE_NAME}.conf"),
        }
    }

    /// Link that activates the definition, when the layout has one.
    pub fn enabled_path(self) -> Option<String> {
        match self {
            ProxyLayout::SitesDirs => Some(format!("{SITES_ENABLED}/{SITE_NAME}")),
            ProxyLayout::ConfD => None,
        }
    }

    fn directory(self) -> &'static str {
        match self {
            ProxyLayout::SitesDirs => SITES_AVAILABLE,
            ProxyLayout::ConfD => CONF_D,
        }
    }
}

/// Every path the site may occupy, across layouts.
pub fn site_paths() -> [String; 3] {
    [
        ProxyLayout::SitesDirs.available_path(),
        format!("{SITES_ENABLED}/{SITE_NAME}"),
        ProxyLayout::ConfD.available_path(),
    ]
}

/// The site definition for one upstream port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxySite {
    pub upstream_port: u16,
}

impl ProxySite {
    pub fn new(upstream_port: u16) -> Self {
        Self { upstream_port }
    }

    pub fn render(&self) -> String {
        format!(
            r#"# Managed by {SITE_NAME}. Changes are overwritten on the next deploy.
server {{
    listen 80;
    server_name _;

    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_cache_bypass $http_upgrade;
    }}
}}
"#,
            port = self.upstream_port
        )
    }
}

/// The active rule after configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    pub layout: ProxyLayout,
    pub path: String,
    pub upstream_port: u16,
}

pub struct ProxyConfigurator<'a> {
    remote: &'a Remote,
}

impl<'a> ProxyConfigurator<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }

    pub async fn configure(
        &self,
        site: ProxySite,
        diag: &mut Diagnostics,
    ) -> Result<ProxyRule, DeployError> {
        let layout = ProxyLayout::detect(self.remote)
            .await
            .during(Stage::Proxy)?;
        let path = layout.available_path();
        tracing::info!(
            "Writing proxy site {} -> 127.0.0.1:{}",
            path,
            site.upstream_port
        );

        self.must(
            RemoteCommand::new("mkdir")
                .args(["-p", layout.directory()])
                .elevated(),
            "create site directory",
        )
        .await?;
        self.must(
            RemoteCommand::new("tee")
                .arg(path.as_str())
                .stdin(site.render())
                .elevated(),
            "write site definition",
        )
        .await?;

        if let Some(enabled) = layout.enabled_path() {
            self.must(
                RemoteCommand::new("ln")
                    .args(["-sfn", path.as_str(), enabled.as_str()])
                    .elevated(),
                "enable site",
            )
            .await?;

            self.disable_default_site(diag).await?;
        }

        let check = test_config(self.remote).await.during(Stage::Proxy)?;
        if !check.success() {
            remove_site_files(self.remote).await.during(Stage::Proxy)?;
            restore_default_site(self.remote).await.during(Stage::Proxy)?;
            return Err(DeployError::ProxyConfig(format!(
                "nginx -t rejected the configuration, site removed and nginx not reloaded: {}",
                check.diagnostic()
            )));
        }

        self.must(reload_command(), "reload nginx").await?;
        Ok(ProxyRule {
            layout,
            path,
            upstream_port: site.upstream_port,
        })
    }

    /// Remove the `sites-enabled/default` link, recording it first so
    /// teardown can put it back. Failures only warn.
    async fn disable_default_site(&self, diag: &mut Diagnostics) -> Result<(), DeployError> {
        let enabled = format!("{SITES_ENABLED}/default");
        let present = self
            .remote
            .succeeds(&RemoteCommand::probe("test").args(["-e", enabled.as_str()]))
            .await
            .during(Stage::Proxy)?;
        if !present {
            return Ok(());
        }

        let record = RemoteCommand::new("tee")
            .arg(DEFAULT_SITE_MARKER)
            .stdin(format!("{SITES_AVAILABLE}/default\n"))
            .elevated();
        let output = self.remote.run(&record).await.during(Stage::Proxy)?;
        if !output.success() {
            diag.warn(Warning::default_site(format!(
                "could not record the default site, leaving it enabled: {}",
                output.diagnostic()
            )));
            return Ok(());
        }

        let output = self
            .remote
            .run(&RemoteCommand::new("rm").args(["-f", enabled.as_str()]).elevated())
            .await
            .during(Stage::Proxy)?;
        if !output.success() {
            diag.warn(Warning::default_site(format!(
                "could not disable the default site: {}",
                output.diagnostic()
            )));
        }
        Ok(())
    }

    async fn must(&self, command: RemoteCommand, what: &str) -> Result<(), DeployError> {
        let output = self.remote.run(&command).await.during(Stage::Proxy)?;
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::ProxyConfig(format!(
                "{what} failed: {}",
                output.diagnostic()
            )))
        }
    }
}

/// `nginx -t` as root.
pub async fn test_config(remote: &Remote) -> Result<crate::ssh::CommandOutput, RemoteError> {
    remote
        .run(&RemoteCommand::probe("nginx").arg("-t").elevated())
        .await
}

pub fn reload_command() -> RemoteCommand {
    RemoteCommand::new("systemctl")
        .args(["reload-or-restart", "nginx"])
        .elevated()
}

/// Remove every path the site may occupy. Returns whether `rm` succeeded.
pub async fn remove_site_files(remote: &Remote) -> Result<bool, RemoteError> {
    let paths = site_paths();
    let rm = RemoteCommand::new("rm")
        .arg("-f")
        .args(paths.iter().map(String::as_str))
        .elevated();
    remote.succeeds(&rm).await
}

/// Re-enable the default site a deploy disabled.
///
/// `None` when nothing was disabled, otherwise whether the link is back.
/// The marker is only removed once the link is restored.
pub async fn restore_default_site(remote: &Remote) -> Result<Option<bool>, RemoteError> {
    let marked = remote
        .succeeds(&RemoteCommand::probe("test").args(["-f", DEFAULT_SITE_MARKER]))
        .await?;
    if !marked {
        return Ok(None);
    }

    let available = format!("{SITES_AVAILABLE}/default");
    let enabled = format!("{SITES_ENABLED}/default");
    let exists = remote
        .succeeds(&RemoteCommand::probe("test").args(["-e", available.as_str()]))
        .await?;
    if exists {
        let link = RemoteCommand::new("ln")
            .args(["-sfn", available.as_str(), enabled.as_str()])
            .elevated();
        if !remote.succeeds(&link).await? {
            return Ok(Some(false));
        }
    }

    let unmark = RemoteCommand::new("rm")
        .args(["-f", DEFAULT_SITE_MARKER])
        .elevated();
    remote.succeeds(&unmark).await?;
    Ok(Some(exists))
}
