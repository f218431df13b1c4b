//! Component restarts.
//!
//! The supervisor never manages process lifecycles itself. It asks a
//! [`Restarter`] to restart a component by name and learns the outcome
//! asynchronously through the [`RestartWorker`].

mod worker;

pub use worker::{RestartRequest, RestartWorker};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::process::{render_argv, run_command};
use crate::{Error, Result};

/// Something that can restart a named component.
#[async_trait]
pub trait Restarter: Send + Sync {
    /// Restart `component`. Success means the restart was issued, not that
    /// the component is healthy again.
    async fn restart(&self, component: &str) -> Result<()>;
}

/// Result of one restart attempt, reported back to the policy engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Succeeded,
    Failed(String),
}

impl RestartOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<Result<()>> for RestartOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(Error::RestartDispatch { detail, .. }) => Self::Failed(detail),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// `[restart]` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Argv template; `{component}` is replaced by the component name.
    #[serde(default)]
    pub command: Vec<String>,
    /// Per-component argv templates that replace `command`.
    #[serde(default)]
    pub overrides: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            overrides: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RestartConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Argv template used for `component`.
    pub fn template_for(&self, component: &str) -> &[String] {
        self.overrides
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or(&self.command)
    }
}

/// Restarts components by running an external command.
#[derive(Debug, Clone)]
pub struct CommandRestarter {
    config: RestartConfig,
}

impl CommandRestarter {
    pub fn new(config: RestartConfig) -> Result<Self> {
        if config.timeout_secs == 0 {
            return Err(Error::config("restart.timeout_secs must be greater than 0"));
        }
        if let Some((name, _)) = config.overrides.iter().find(|(_, argv)| argv.is_empty()) {
            return Err(Error::config(format!(
                "restart override for '{}' must not be empty",
                name
            )));
        }
        Ok(Self { config })
    }

    /// The argv that would be run for `component`.
    pub fn argv_for(&self, component: &str) -> Vec<String> {
        render_argv(
            self.config.template_for(component),
            &[("component", component)],
        )
    }
}

#[async_trait]
impl Restarter for CommandRestarter {
    async fn restart(&self, component: &str) -> Result<()> {
        let argv = self.argv_for(component);
        if argv.is_empty() {
            return Err(Error::restart(component, "no restart command configured"));
        }

        debug!(component = %component, argv = ?argv, "Running restart command");
        let output = tokio::time::timeout(self.config.timeout(), run_command(&argv, None))
            .await
            .map_err(|_| {
                Error::restart(
                    component,
                    format!("timed out after {}s", self.config.timeout_secs),
                )
            })?
            .map_err(|e| Error::restart(component, e.to_string()))?;

        if !output.success() {
            return Err(Error::restart(component, output.failure_detail()));
        }

        info!(component = %component, "Restart command completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_override_replaces_default_command() {
        let mut overrides = BTreeMap::new();
        overrides.insert("store".to_string(), argv(&["systemctl", "restart", "mongod"]));
        let restarter = CommandRestarter::new(RestartConfig {
            command: argv(&["docker", "compose", "restart", "{component}"]),
            overrides,
            timeout_secs: 10,
        })
        .unwrap();

        assert_eq!(restarter.argv_for("worker"), argv(&["docker", "compose", "restart", "worker"]));
        assert_eq!(restarter.argv_for("store"), argv(&["systemctl", "restart", "mongod"]));
    }

    #[test]
    fn test_rejects_empty_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert("store".to_string(), Vec::new());
        let err = CommandRestarter::new(RestartConfig {
            overrides,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(RestartOutcome::from(Ok(())), RestartOutcome::Succeeded);
        let failed = RestartOutcome::from(Err(Error::restart("store", "unreachable")));
        assert_eq!(failed, RestartOutcome::Failed("unreachable".to_string()));
    }

    #[tokio::test]
    async fn test_missing_command_is_dispatch_error() {
        let restarter = CommandRestarter::new(RestartConfig::default()).unwrap();
        let err = restarter.restart("store").await.unwrap_err();
        assert!(matches!(err, Error::RestartDispatch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_exit_status() {
        let ok = CommandRestarter::new(RestartConfig {
            command: argv(&["sh", "-c", "test {component} = worker"]),
            ..Default::default()
        })
        .unwrap();
        ok.restart("worker").await.unwrap();
        assert!(ok.restart("store").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let slow = CommandRestarter::new(RestartConfig {
            command: argv(&["sleep", "5"]),
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();
        let err = slow.restart("store").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
