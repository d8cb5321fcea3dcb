// ABOUTME: RemoteShell seam and the interrupt-aware executor used by every stage.
// ABOUTME: Dry runs record mutating commands instead of sending them.

use super::command::{Escalation, RemoteCommand};
use crate::interrupt::Interrupt;
use crate::ssh::{self, CommandOutput, Session};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Anything that can execute rendered shell text on the target host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> ssh::Result<CommandOutput>;

    /// Release the underlying connection.
    async fn close(&self) -> ssh::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> ssh::Result<CommandOutput> {
        match stdin {
            Some(data) => self.exec_with_stdin(command, data).await,
            None => Session::exec(self, command).await,
        }
    }

    async fn close(&self) -> ssh::Result<()> {
        self.disconnect().await
    }
}

/// Stand-in used when the handshake is skipped: every command succeeds silently.
#[derive(Debug, Default)]
pub struct DryRunShell {
    issued: Mutex<Vec<String>>,
}

impl DryRunShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl RemoteShell for DryRunShell {
    async fn exec(&self, command: &str, _stdin: Option<&[u8]>) -> ssh::Result<CommandOutput> {
        self.issued.lock().push(command.to_string());
        Ok(CommandOutput::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("interrupted before `{0}`")]
    Interrupted(String),

    #[error("`{command}` failed: {source}")]
    Transport {
        command: String,
        #[source]
        source: ssh::Error,
    },
}

/// Executes typed commands against a shell, honouring dry-run and interrupts.
pub struct Remote {
    shell: Arc<dyn RemoteShell>,
    escalation: Escalation,
    interrupt: Interrupt,
    dry_run: bool,
    planned: Mutex<Vec<String>>,
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("escalation", &self.escalation)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Remote {
    pub fn new(shell: Arc<dyn RemoteShell>, escalation: Escalation, interrupt: Interrupt) -> Self {
        Self {
            shell,
            escalation,
            interrupt,
            dry_run: false,
            planned: Mutex::new(Vec::new()),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Mutating commands skipped during a dry run, in order.
    pub fn planned(&self) -> Vec<String> {
        self.planned.lock().clone()
    }

    /// Run a command and return its output regardless of exit status.
    pub async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput, RemoteError> {
        let rendered = command.render(self.escalation);

        if self.interrupt.is_triggered() {
            return Err(RemoteError::Interrupted(rendered));
        }

        if self.dry_run && command.is_mutating() {
            tracing::info!("would run: {}", rendered);
            self.planned.lock().push(rendered);
            return Ok(CommandOutput::default());
        }

        tracing::debug!(command = %rendered, "remote exec");
        let output = self
            .shell
            .exec(&rendered, command.stdin_data())
            .await
            .map_err(|source| RemoteError::Transport {
                command: rendered.clone(),
                source,
            })?;

        tracing::debug!(
            exit_code = output.exit_code,
            stderr = %output.stderr.trim(),
            "remote exec finished"
        );
        Ok(output)
    }

    pub async fn close(&self) -> ssh::Result<()> {
        self.shell.close().await
    }

    /// Run a command and report whether it exited 0.
    pub async fn succeeds(&self, command: &RemoteCommand) -> Result<bool, RemoteError> {
        Ok(self.run(command).await?.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dry_remote() -> (Arc<DryRunShell>, Remote) {
        let shell = Arc::new(DryRunShell::new());
        let remote =
            Remote::new(shell.clone(), Escalation::Sudo, Interrupt::new()).dry_run(true);
        (shell, remote)
    }

    #[tokio::test]
    async fn dry_run_records_mutations_without_sending() {
        let (shell, remote) = dry_remote();

        remote
            .run(&RemoteCommand::new("rm").args(["-rf", "/srv/app"]).elevated())
            .await
            .unwrap();
        remote.run(&RemoteCommand::probe("id").arg("-u")).await.unwrap();

        assert_eq!(remote.planned(), vec!["sudo -n rm -rf /srv/app".to_string()]);
        assert_eq!(shell.issued(), vec!["id -u".to_string()]);
    }

    #[tokio::test]
    async fn interrupted_remote_refuses_new_commands() {
        let (shell, remote) = dry_remote();
        remote.interrupt().trigger();

        let err = remote.run(&RemoteCommand::probe("true")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Interrupted(_)));
        assert!(shell.issued().is_empty());
    }
}
