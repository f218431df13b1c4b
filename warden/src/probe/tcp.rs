//! TCP connect probe.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::trace;

use super::Probe;
use crate::{Error, Result};

/// TCP probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpProbeConfig {
    /// Component name.
    pub name: String,
    /// `host:port` to connect to.
    pub address: String,
    /// Per-probe timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Advisory probes alert but never restart.
    #[serde(default)]
    pub advisory: bool,
}

/// Succeeds when a TCP connection to the target can be established.
#[derive(Debug)]
pub struct TcpProbe {
    config: TcpProbeConfig,
}

impl TcpProbe {
    pub fn new(config: TcpProbeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn restart_eligible(&self) -> bool {
        !self.config.advisory
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_secs.map(Duration::from_secs)
    }

    async fn check(&self) -> Result<()> {
        let stream = TcpStream::connect(&self.config.address)
            .await
            .map_err(|e| Error::probe(format!("connect to {} failed: {}", self.config.address, e)))?;
        trace!(
            component = %self.config.name,
            peer = ?stream.peer_addr().ok(),
            "TCP probe connected"
        );
        // Dropping the stream closes the connection again.
        Ok(())
    }
}
