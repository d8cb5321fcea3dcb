// ABOUTME: Cooperative cancellation flag flipped by Ctrl-C.
// ABOUTME: Checked between commands and stages so in-flight remote and local work is never cut.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that flips the flag on the first Ctrl-C.
    pub fn listen(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current command");
                flag.trigger();
            }
        });
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A local child process outside the terminal's foreground process group,
/// so Ctrl-C reaches only us and the child runs to completion.
pub fn local_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}
