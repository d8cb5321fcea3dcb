// ABOUTME: SSH session to the target host using russh with a single private key.
// ABOUTME: Bounded connect, known_hosts verification, and command execution with optional stdin.

use super::error::{Error, Result};
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{check_known_hosts, learn_known_hosts};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Interval of SSH-level keepalives while a long command is silent.
const KEEPALIVE: Duration = Duration::from_secs(15);

/// How to reach and authenticate to the host.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    /// Record an unknown host key instead of refusing it. A changed key is
    /// always refused.
    pub trust_first_connection: bool,
    /// Bound on TCP connect, key exchange, and authentication together.
    pub connect_timeout: Duration,
    /// Bound on any single command.
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: key_path.into(),
            trust_first_connection: true,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(1800),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn trust_first_connection(mut self, trust: bool) -> Self {
        self.trust_first_connection = trust;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Exit status and captured streams of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Host key check against the user's known_hosts.
pub(crate) struct HostKeyVerifier {
    host: String,
    port: u16,
    trust_first_connection: bool,
}

impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) if self.trust_first_connection => {
                tracing::warn!(
                    "Recording previously unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                if let Err(e) = learn_known_hosts(&self.host, self.port, server_public_key) {
                    tracing::warn!("Could not update known_hosts: {}", e);
                }
                Ok(true)
            }
            Ok(false) => {
                tracing::error!(
                    "Host key for {}:{} is not in known_hosts and first-connection trust is off",
                    self.host,
                    self.port
                );
                Ok(false)
            }
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(
                    "Host key for {}:{} differs from the one in known_hosts",
                    self.host,
                    self.port
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("Could not read known_hosts: {}", e);
                Ok(self.trust_first_connection)
            }
        }
    }
}

/// An authenticated SSH connection.
pub struct Session {
    config: SessionConfig,
    handle: Handle<HostKeyVerifier>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.address())
            .field("user", &self.config.user)
            .finish()
    }
}

impl Session {
    /// Connect and authenticate, bounded by `connect_timeout`.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, Self::establish(config.clone()))
            .await
            .map_err(|_| Error::ConnectTimeout {
                host: config.address(),
                timeout,
            })?
    }

    async fn establish(config: SessionConfig) -> Result<Self> {
        let key = load_secret_key(&config.key_path, None).map_err(|e| Error::KeyLoadFailed {
            path: config.key_path.clone(),
            reason: e.to_string(),
        })?;

        let russh_config = Config {
            inactivity_timeout: Some(config.command_timeout),
            keepalive_interval: Some(KEEPALIVE),
            ..Default::default()
        };
        let verifier = HostKeyVerifier {
            host: config.host.clone(),
            port: config.port,
            trust_first_connection: config.trust_first_connection,
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            verifier,
        )
        .await
        .map_err(|e| Error::Connection(format!("{}: {}", config.address(), e)))?;

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(Error::Protocol)?
            .flatten();
        let auth = handle
            .authenticate_publickey(
                &config.user,
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(Error::Protocol)?;
        if !auth.success() {
            return Err(Error::AuthenticationFailed {
                user: config.user.clone(),
                key: config.key_path.clone(),
            });
        }

        tracing::debug!("Authenticated to {} as {}", config.address(), config.user);
        Ok(Self { config, handle })
    }

    /// Run a command and collect its output.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.exec_bounded(command, None).await
    }

    /// Run a command, writing `stdin` to it before closing the input stream.
    pub async fn exec_with_stdin(&self, command: &str, stdin: &[u8]) -> Result<CommandOutput> {
        self.exec_bounded(command, Some(stdin)).await
    }

    async fn exec_bounded(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let timeout = self.config.command_timeout;
        tokio::time::timeout(timeout, self.exec_channel(command, stdin))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))?
    }

    async fn exec_channel(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let failed = |what: &str, e: russh::Error| Error::CommandFailed(format!("{what}: {e}"));

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| failed("open channel", e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| failed("exec", e))?;
        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| failed("write stdin", e))?;
        }
        channel.eof().await.map_err(|e| failed("close stdin", e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut eof = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::Eof => eof = true,
                ChannelMsg::Close => break,
                _ => {}
            }
            if eof && exit_code.is_some() {
                break;
            }
        }

        // No exit status means the channel died (network drop, killed sshd).
        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }
}
