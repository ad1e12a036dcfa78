//! Concrete health sources: HTTP, TCP and shell command probes.

use super::HealthSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// What to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthTarget {
    /// Passes on the expected status, or any 2xx when none is given.
    Http {
        url: String,
        #[serde(default)]
        expect_status: Option<u16>,
    },
    /// Passes when a TCP connection can be established.
    Tcp { address: String },
    /// Passes when `sh -c <command>` exits zero.
    Command { command: String },
}

impl std::fmt::Display for HealthTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthTarget::Http { url, .. } => write!(f, "{url}"),
            HealthTarget::Tcp { address } => write!(f, "tcp://{address}"),
            HealthTarget::Command { command } => write!(f, "`{command}`"),
        }
    }
}

/// Probes targets over the network or by running a command.
pub struct ProbeSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl ProbeSource {
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .context("Failed to build HTTP client for health probes")?;
        Ok(Self {
            client,
            timeout: probe_timeout,
        })
    }

    async fn check_http(&self, url: &str, expect_status: Option<u16>) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let passed = match expect_status {
                    Some(code) => status.as_u16() == code,
                    None => status.is_success(),
                };
                debug!(url, status = status.as_u16(), passed, "HTTP probe");
                passed
            }
            Err(e) => {
                debug!(url, error = %e, "HTTP probe failed");
                false
            }
        }
    }

    async fn check_tcp(&self, address: &str) -> bool {
        match timeout(self.timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(address, error = %e, "TCP probe failed");
                false
            }
            Err(_) => {
                debug!(address, "TCP probe timed out");
                false
            }
        }
    }

    async fn check_command(&self, command: &str) -> bool {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                debug!(command, error = %e, "Command probe could not start");
                return false;
            }
        };
        match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(command, error = %e, "Command probe failed");
                false
            }
            Err(_) => {
                debug!(command, "Command probe timed out");
                false
            }
        }
    }
}

#[async_trait]
impl HealthSource for ProbeSource {
    async fn check(&self, target: &HealthTarget) -> bool {
        match target {
            HealthTarget::Http { url, expect_status } => self.check_http(url, *expect_status).await,
            HealthTarget::Tcp { address } => self.check_tcp(address).await,
            HealthTarget::Command { command } => self.check_command(command).await,
        }
    }
}
