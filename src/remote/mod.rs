// ABOUTME: Structured remote execution on top of the SSH session.
// ABOUTME: Typed command builders, the RemoteShell seam, and the interrupt-aware executor.

mod command;
mod shell;

pub use command::{Escalation, RemoteCommand, quote};
pub use shell::{DryRunShell, Remote, RemoteError, RemoteShell};
