// ABOUTME: Command module aggregator for the dockhand CLI.
// ABOUTME: Re-exports the deploy and cleanup handlers and the shared remote setup.

mod cleanup;
mod deploy;

pub use cleanup::cleanup;
pub use deploy::deploy;

use dockhand::config::RunConfig;
use dockhand::deploy::connect;
use dockhand::error::Result;
use dockhand::interrupt::Interrupt;
use dockhand::output::Output;
use dockhand::remote::{DryRunShell, Escalation, Remote};
use std::sync::Arc;

/// Connect over SSH, or stand in a simulated shell for a dry run.
async fn open_remote(config: &RunConfig, interrupt: &Interrupt, output: &Output) -> Result<Remote> {
    let escalation = Escalation::for_user(&config.target.user);

    if config.dry_run {
        output.progress("  → Dry run: skipping SSH handshake");
        return Ok(Remote::new(Arc::new(DryRunShell::new()), escalation, interrupt.clone()).dry_run(true));
    }

    output.progress(&format!(
        "  → Connecting to {}@{}:{}...",
        config.target.user, config.target.host, config.target.port
    ));
    let session = connect(&config.target, &config.timeouts).await?;
    Ok(Remote::new(Arc::new(session), escalation, interrupt.clone()))
}

/// Close the connection; failure only warrants a warning.
async fn close_remote(remote: &Remote, output: &Output) {
    if let Err(e) = remote.close().await {
        output.warning(&format!("SSH disconnect failed: {e}"));
    }
}

/// Print each skipped command of a dry run.
fn print_plan(remote: &Remote, output: &Output) {
    if !remote.is_dry_run() {
        return;
    }
    for command in remote.planned() {
        output.progress(&format!("    would run: {command}"));
    }
}
