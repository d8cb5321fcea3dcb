// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Construction requires a ConnectivityProof, so nothing mutates an unverified host.

use super::probe::ConnectivityProof;
use super::state::{Connected, Started, Validated};
use crate::config::RunConfig;
use crate::diagnostics::Diagnostics;
use crate::remote::Remote;
use serde::Serialize;
use std::path::PathBuf;

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries what earlier stages produced, so
/// for example the proxy can only be configured once an upstream port is
/// known to be serving.
#[derive(Debug)]
pub struct Deployment<'a, S> {
    pub(crate) config: &'a RunConfig,
    pub(crate) remote: &'a Remote,
    pub(crate) source: PathBuf,
    pub(crate) diag: Diagnostics,
    pub(crate) state: S,
}

impl<'a> Deployment<'a, Connected> {
    pub fn new(
        config: &'a RunConfig,
        remote: &'a Remote,
        source: PathBuf,
        _proof: ConnectivityProof,
    ) -> Self {
        Deployment {
            config,
            remote,
            source,
            diag: Diagnostics::default(),
            state: Connected,
        }
    }
}

impl<S> Deployment<'_, S> {
    pub fn config(&self) -> &RunConfig {
        self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Local working tree being deployed.
    pub fn source(&self) -> &PathBuf {
        &self.source
    }
}

impl Deployment<'_, Started> {
    pub fn upstream_port(&self) -> u16 {
        self.state.app.upstream_port
    }
}

/// Summary of a finished deploy.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub host: String,
    pub remote_dir: String,
    pub mode: Option<String>,
    pub image: Option<String>,
    pub upstream_port: u16,
    pub proxy_site: String,
    pub loopback_reachable: bool,
    pub external_reachable: Option<bool>,
    pub dry_run: bool,
    pub warnings: Vec<String>,
}

impl Deployment<'_, Validated> {
    pub fn finish(self) -> (DeployReport, Diagnostics) {
        let Validated { app, rule, outcome } = self.state;
        let report = DeployReport {
            host: self.config.target.host.clone(),
            remote_dir: self.config.target.remote_dir.to_string(),
            mode: app.mode.map(|m| m.to_string()),
            image: app.image,
            upstream_port: app.upstream_port,
            proxy_site: rule.path,
            loopback_reachable: outcome.loopback_reachable,
            external_reachable: outcome.external_reachable,
            dry_run: self.config.dry_run,
            warnings: self
                .diag
                .warnings()
                .iter()
                .map(|w| w.message.clone())
                .collect(),
        };
        (report, self.diag)
    }
}

