// ABOUTME: SSH client module for the target host.
// ABOUTME: Key-based authentication with known_hosts verification and bounded commands.

mod client;
mod error;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
