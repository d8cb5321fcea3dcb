// ABOUTME: Post-deploy checks: docker active and nginx config valid are fatal.
// ABOUTME: Loopback and external HTTP reachability are advisory warnings.

use super::error::{DeployError, RemoteResultExt, Stage};
use super::execute::loopback_probe;
use super::proxy::test_config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::remote::{Remote, RemoteCommand};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;

/// Advisory results; fatal checks either pass or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub loopback_reachable: bool,
    /// `None` when the probe was skipped (dry run).
    pub external_reachable: Option<bool>,
}

/// Plain HTTP `GET /` from this machine.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    port: u16,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { port: 80, timeout }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Status code of `GET /`, or why no response arrived.
    pub async fn get(&self, host: &str) -> Result<u16, String> {
        tokio::time::timeout(self.timeout, self.request(host))
            .await
            .map_err(|_| format!("no response within {:?}", self.timeout))?
    }

    async fn request(&self, host: &str) -> Result<u16, String> {
        let stream = TcpStream::connect((host, self.port))
            .await
            .map_err(|e| format!("connect failed: {e}"))?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| format!("HTTP handshake failed: {e}"))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("probe connection error: {}", e);
            }
        });

        let authority = if self.port == 80 {
            host.to_string()
        } else {
            format!("{host}:{}", self.port)
        };
        let req = hyper::Request::builder()
            .method("GET")
            .uri("/")
            .header("Host", authority)
            .header("User-Agent", concat!("dockhand/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| format!("failed to build request: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        Ok(resp.status().as_u16())
    }
}

pub struct DeploymentValidator<'a> {
    remote: &'a Remote,
    probe: HttpProbe,
    http_timeout: Duration,
}

impl<'a> DeploymentValidator<'a> {
    pub fn new(remote: &'a Remote, http_timeout: Duration) -> Self {
        Self {
            remote,
            probe: HttpProbe::new(http_timeout),
            http_timeout,
        }
    }

    pub fn with_probe(mut self, probe: HttpProbe) -> Self {
        self.probe = probe;
        self
    }

    pub async fn validate(
        &self,
        host: &str,
        upstream_port: u16,
        diag: &mut Diagnostics,
    ) -> Result<ValidationOutcome, DeployError> {
        let active = self
            .remote
            .run(
                &RemoteCommand::probe("systemctl")
                    .args(["is-active", "docker"])
                    .elevated(),
            )
            .await
            .during(Stage::Validation)?;
        if !active.success() {
            return Err(DeployError::Validation(format!(
                "docker service is not active: {}",
                active.diagnostic()
            )));
        }

        let config = test_config(self.remote).await.during(Stage::Validation)?;
        if !config.success() {
            return Err(DeployError::Validation(format!(
                "nginx configuration is invalid: {}",
                config.diagnostic()
            )));
        }

        let loopback_reachable = loopback_probe(self.remote, upstream_port, self.http_timeout)
            .await
            .during(Stage::Validation)?;
        if !loopback_reachable {
            diag.warn(Warning::loopback_probe(format!(
                "no HTTP response on 127.0.0.1:{upstream_port}; the application may still be warming up"
            )));
        }

        let external_reachable = if self.remote.is_dry_run() {
            tracing::info!("would probe http://{}/", host);
            None
        } else {
            Some(self.check_external(host, diag).await)
        };

        Ok(ValidationOutcome {
            loopback_reachable,
            external_reachable,
        })
    }

    async fn check_external(&self, host: &str, diag: &mut Diagnostics) -> bool {
        match self.probe.get(host).await {
            Ok(status) if status < 400 => {
                tracing::info!("External probe of {} returned {}", host, status);
                true
            }
            Ok(status) => {
                diag.warn(Warning::external_probe(format!(
                    "http://{host}/ answered with status {status}"
                )));
                false
            }
            Err(reason) => {
                diag.warn(Warning::external_probe(format!(
                    "http://{host}/ is not reachable from here ({reason}); check the firewall"
                )));
                false
            }
        }
    }
}
