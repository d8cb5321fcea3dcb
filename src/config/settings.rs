// ABOUTME: Resolution of file config plus CLI overrides into an immutable RunConfig.
// ABOUTME: RunConfig is the explicit context object handed to every stage.

use super::FileConfig;
use crate::error::{Error, Result};
use crate::ssh::SessionConfig;
use crate::types::{BranchName, RemoteDir, RepoName, RepoUrl, Token};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Username paired with the token in the git credential store.
pub const DEFAULT_TOKEN_USER: &str = "x-access-token";

/// Which half of the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Deploy,
    Cleanup,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Deploy => write!(f, "deploy"),
            RunMode::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Values supplied on the command line. `None` falls back to the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub token: Option<String>,
    pub server: Option<String>,
    pub user: Option<String>,
    pub ssh_port: Option<u16>,
    pub key: Option<PathBuf>,
    pub remote_dir: Option<String>,
    pub app_port: Option<u16>,
    pub host_port: Option<u16>,
    pub workspace: Option<PathBuf>,
    pub cleanup: bool,
    pub dry_run: bool,
}

/// Where the source comes from and where it lives locally.
#[derive(Debug, Clone)]
pub struct SourceReference {
    pub url: RepoUrl,
    pub repo: RepoName,
    pub branch: BranchName,
    /// Pure function of the URL: `<workspace>/<repo>`.
    pub local_path: PathBuf,
    pub token: Token,
    pub token_user: String,
}

/// The single host and directory being deployed to.
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    pub remote_dir: RemoteDir,
    pub trust_first_connection: bool,
}

impl DeploymentTarget {
    /// `user@host` as understood by ssh and rsync.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn session_config(&self, timeouts: &Timeouts) -> SessionConfig {
        SessionConfig::new(&self.host, &self.user, &self.key_path)
            .port(self.port)
            .trust_first_connection(self.trust_first_connection)
            .connect_timeout(timeouts.connect)
            .command_timeout(timeouts.command)
    }
}

/// Application ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSettings {
    /// Port the application listens on inside its container.
    pub app_port: u16,
    /// Loopback port published by the single-container path.
    pub host_port: Option<u16>,
}

impl AppSettings {
    pub fn published_port(&self) -> u16 {
        self.host_port.unwrap_or(self.app_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on the initial handshake.
    pub connect: Duration,
    /// Bound on any single remote command.
    pub command: Duration,
    /// Wait after starting the application before probing it.
    pub settle: Duration,
    /// Bound on each HTTP probe.
    pub http: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            command: Duration::from_secs(1800),
            settle: Duration::from_secs(5),
            http: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub dry_run: bool,
    pub source: SourceReference,
    pub target: DeploymentTarget,
    pub app: AppSettings,
    pub timeouts: Timeouts,
}

impl RunConfig {
    /// Merge the optional file with CLI overrides and validate everything.
    ///
    /// `cwd` anchors the default workspace; `home` anchors `~` and the
    /// default SSH key lookup.
    pub fn resolve(
        file: Option<FileConfig>,
        overrides: Overrides,
        cwd: &Path,
        home: Option<&Path>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();

        let repository = overrides
            .repository
            .or(file.repository)
            .ok_or_else(|| Error::Input("repository URL is required (--repo)".to_string()))?;
        let url = RepoUrl::parse(&repository).map_err(|e| Error::Input(e.to_string()))?;
        let repo = url.repo_name().map_err(|e| Error::Input(e.to_string()))?;

        let branch = match overrides.branch.or(file.branch) {
            Some(b) => BranchName::new(&b).map_err(|e| Error::Input(e.to_string()))?,
            None => BranchName::default(),
        };

        let token = resolve_token(overrides.token, file.token.as_ref())?;

        let mut server = match overrides.server {
            Some(s) => super::ServerConfig::parse(&s).map_err(Error::Input)?,
            None => file
                .server
                .ok_or_else(|| Error::Input("remote host is required (--host)".to_string()))?,
        };
        if let Some(port) = overrides.ssh_port {
            server.port = port;
        }
        let user = overrides
            .user
            .or(server.user.clone())
            .ok_or_else(|| Error::Input("remote SSH user is required (--user)".to_string()))?;
        validate_user(&user)?;

        let key_path = resolve_key(overrides.key.or(server.key.clone()), home)?;

        let remote_dir = match overrides.remote_dir.or(file.remote_dir) {
            Some(dir) => RemoteDir::new(&dir).map_err(|e| Error::Input(e.to_string()))?,
            None => RemoteDir::default_for(&user, &repo).map_err(|e| Error::Input(e.to_string()))?,
        };

        let app_port = overrides
            .app_port
            .or(file.app_port)
            .ok_or_else(|| Error::Input("application port is required (--port)".to_string()))?;
        if app_port == 0 {
            return Err(Error::Input("application port must be non-zero".to_string()));
        }
        let host_port = overrides.host_port.or(file.host_port);
        if host_port == Some(0) {
            return Err(Error::Input("host port must be non-zero".to_string()));
        }

        let workspace = overrides
            .workspace
            .or(file.workspace)
            .map(|w| expand_home(&w, home))
            .unwrap_or_else(|| cwd.to_path_buf());
        let workspace = if workspace.is_absolute() {
            workspace
        } else {
            cwd.join(workspace)
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            connect: file.timeouts.connect.unwrap_or(defaults.connect),
            command: file.timeouts.command.unwrap_or(defaults.command),
            settle: file.timeouts.settle.unwrap_or(defaults.settle),
            http: file.timeouts.http.unwrap_or(defaults.http),
        };

        Ok(Self {
            mode: if overrides.cleanup {
                RunMode::Cleanup
            } else {
                RunMode::Deploy
            },
            dry_run: overrides.dry_run,
            source: SourceReference {
                local_path: workspace.join(repo.as_str()),
                url,
                repo,
                branch,
                token,
                token_user: file
                    .token_user
                    .unwrap_or_else(|| DEFAULT_TOKEN_USER.to_string()),
            },
            target: DeploymentTarget {
                host: server.host,
                port: server.port,
                user,
                key_path,
                remote_dir,
                trust_first_connection: server.trust_first_connection,
            },
            app: AppSettings {
                app_port,
                host_port,
            },
            timeouts,
        })
    }
}

fn resolve_token(cli: Option<String>, file: Option<&super::EnvValue>) -> Result<Token> {
    let raw = match (cli, file) {
        (Some(value), _) => value,
        (None, Some(value)) => value
            .resolve()
            .map_err(|e| Error::MissingCredentials(e.to_string()))?,
        (None, None) => {
            return Err(Error::MissingCredentials(
                "authentication token is required (--token or DOCKHAND_TOKEN)".to_string(),
            ));
        }
    };
    Token::new(raw)
        .ok_or_else(|| Error::MissingCredentials("authentication token is empty".to_string()))
}

fn validate_user(user: &str) -> Result<()> {
    let valid = !user.is_empty()
        && !user.starts_with('-')
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::Input(format!("invalid SSH user: {user:?}")))
    }
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Explicit keys must exist; otherwise the first of the usual defaults wins.
fn resolve_key(explicit: Option<PathBuf>, home: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand_home(&path, home);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(Error::MissingKey(path))
        };
    }

    let ssh_dir = home
        .map(|h| h.join(".ssh"))
        .ok_or_else(|| Error::MissingKey(PathBuf::from("~/.ssh/id_ed25519")))?;
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| Error::MissingKey(ssh_dir.join("id_ed25519")))
}
