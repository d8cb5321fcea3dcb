// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Each state carries what the previous stage produced.

use super::execute::StartedApp;
use super::provision::RuntimeProfile;
use super::proxy::ProxyRule;
use super::validate::ValidationOutcome;

/// Connectivity proven, nothing mutated yet.
/// Available actions: `provision()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Connected;

/// Host baseline in place.
/// Available actions: `transfer()`
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub(crate) profile: RuntimeProfile,
}

/// Source tree mirrored to the deployment directory.
/// Available actions: `start()`
#[derive(Debug, Clone)]
pub struct Transferred {
    pub(crate) profile: RuntimeProfile,
}

/// Application running on loopback.
/// Available actions: `configure_proxy()`
#[derive(Debug, Clone)]
pub struct Started {
    pub(crate) app: StartedApp,
}

/// Proxy rule active.
/// Available actions: `validate()`
#[derive(Debug, Clone)]
pub struct Proxied {
    pub(crate) app: StartedApp,
    pub(crate) rule: ProxyRule,
}

/// Fatal checks passed.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Validated {
    pub(crate) app: StartedApp,
    pub(crate) rule: ProxyRule,
    pub(crate) outcome: ValidationOutcome,
}
