//! External command probe.
//!
//! Runs a check program and treats exit status 0 as healthy. Synthetic
//! checks such as a store write-then-read, a broker round trip or a small
//! ingest-then-cleanup run live in these programs; they own the cleanup of
//! whatever they create.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::Probe;
use crate::utils::process;
use crate::{Error, Result};

/// Command probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandProbeConfig {
    /// Component name.
    pub name: String,
    /// Program and arguments.
    pub command: Vec<String>,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-probe timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Advisory probes alert but never restart.
    #[serde(default)]
    pub advisory: bool,
}

#[derive(Debug)]
pub struct CommandProbe {
    config: CommandProbeConfig,
}

impl CommandProbe {
    pub fn new(config: CommandProbeConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::config(format!(
                "command probe {} has an empty command",
                config.name
            )));
        }
        Ok(Self { config })
    }

    fn argv(&self) -> Vec<String> {
        process::render_argv(&self.config.command, &[("component", &self.config.name)])
    }
}

#[async_trait]
impl Probe for CommandProbe {
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
        let argv = self.argv();
        let mut cmd = process::tokio_command(&argv)?;
        cmd.envs(&self.config.env);

        let output = process::run(cmd, None)
            .await
            .map_err(|e| Error::probe(format!("failed to run {}: {}", argv[0], e)))?;

        trace!(component = %self.config.name, status = %output.status, "Command probe finished");

        if output.success() {
            Ok(())
        } else {
            Err(Error::probe(output.failure_detail()))
        }
    }
}
