// ABOUTME: Library root for dockhand - exposes the deployment core for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod interrupt;
pub mod output;
pub mod remote;
pub mod source;
pub mod ssh;
pub mod types;
