//! Health probes.
//!
//! Every monitored target implements [`Probe`]. The supervisor never calls
//! [`Probe::check`] directly; it goes through [`run_probe`], which enforces
//! the deadline, survives panics inside the probe and always yields a
//! [`ProbeResult`].
//!
//! Concrete adapters:
//! - [`HttpProbe`]: web process, AI provider completion endpoints
//! - [`TcpProbe`]: document store / broker ports, outbound connectivity
//! - [`CommandProbe`]: external synthetic checks (write-then-read, round trips)
//! - [`FnProbe`]: closure-backed probe for embedding

mod command;
mod func;
mod http;
mod tcp;

pub use command::{CommandProbe, CommandProbeConfig};
pub use func::FnProbe;
pub use http::{HttpProbe, HttpProbeConfig};
pub use tcp::{TcpProbe, TcpProbeConfig};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::ProbeResult;
use crate::logging::panic_hook::payload_str;
use crate::state::ComponentStore;
use crate::{Error, Result};

/// A timeout-bounded health check against one monitored target.
///
/// Implementations must undo any side effects they cause, whether the check
/// passes or fails.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Component name this probe reports for.
    fn name(&self) -> &str;

    /// Whether sustained failures may trigger an automatic restart.
    fn restart_eligible(&self) -> bool {
        true
    }

    /// Probe-specific timeout overriding the scheduler default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the check. `Ok(())` means healthy.
    async fn check(&self) -> Result<()>;
}

/// Probe configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeConfig {
    Http(HttpProbeConfig),
    Tcp(TcpProbeConfig),
    Command(CommandProbeConfig),
}

impl ProbeConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Http(c) => &c.name,
            Self::Tcp(c) => &c.name,
            Self::Command(c) => &c.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Tcp(_) => "tcp",
            Self::Command(_) => "command",
        }
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            Self::Http(c) => c.timeout_secs,
            Self::Tcp(c) => c.timeout_secs,
            Self::Command(c) => c.timeout_secs,
        }
    }

    /// Build the probe described by this configuration.
    pub fn build(&self) -> Result<Arc<dyn Probe>> {
        Ok(match self {
            Self::Http(c) => Arc::new(HttpProbe::new(c.clone())?),
            Self::Tcp(c) => Arc::new(TcpProbe::new(c.clone())),
            Self::Command(c) => Arc::new(CommandProbe::new(c.clone())?),
        })
    }
}

/// Run a probe under a deadline.
///
/// The check runs on its own task so that a panic inside the probe surfaces
/// as a failed result instead of unwinding into the scheduler. Exceeding the
/// deadline yields `failure("timeout")`; cancellation aborts the check.
/// The result is stamped with `clock`, the same source the policy engine uses.
pub async fn run_probe(
    probe: Arc<dyn Probe>,
    default_timeout: Duration,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> ProbeResult {
    let name = probe.name().to_string();
    let deadline = probe.timeout().unwrap_or(default_timeout);
    let start = Instant::now();

    let task_probe = probe.clone();
    let mut handle = tokio::spawn(async move { task_probe.check().await });

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            handle.abort();
            Err(Error::probe("cancelled"))
        }
        joined = tokio::time::timeout(deadline, &mut handle) => match joined {
            Err(_) => {
                handle.abort();
                Err(Error::ProbeTimeout)
            }
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                let payload = join_error.into_panic();
                let message = payload_str(payload.as_ref()).unwrap_or("non-string payload");
                warn!(component = %name, panic = %message, "Probe panicked");
                Err(Error::probe(format!("probe panicked: {}", message)))
            }
            Ok(Err(_)) => Err(Error::probe("probe task aborted")),
        }
    };

    let latency = start.elapsed();
    let result = match outcome {
        Ok(()) => ProbeResult::success(&name, latency),
        Err(e) => ProbeResult::failure(&name, e.probe_detail(), latency),
    };

    debug!(
        component = %name,
        success = result.success,
        latency_ms = latency.as_millis() as u64,
        detail = result.detail.as_deref().unwrap_or(""),
        "Probe finished"
    );

    result.at(clock.now())
}

/// Set of registered probes with unique component names.
pub struct ProbeRegistry {
    probes: Vec<Arc<dyn Probe>>,
    names: HashSet<String>,
    store: ComponentStore,
}

impl ProbeRegistry {
    pub fn new(store: ComponentStore) -> Self {
        Self {
            probes: Vec::new(),
            names: HashSet::new(),
            store,
        }
    }

    /// Register a probe and create its component state.
    pub fn register(&mut self, probe: Arc<dyn Probe>) -> Result<()> {
        let name = probe.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::config("probe name must not be empty"));
        }
        if !self.names.insert(name.clone()) {
            return Err(Error::config(format!("duplicate probe name: {}", name)));
        }

        self.store.register(&name, probe.restart_eligible());
        self.probes.push(probe);
        Ok(())
    }

    /// Build and register every configured probe.
    pub fn register_all(&mut self, configs: &[ProbeConfig]) -> Result<()> {
        for config in configs {
            self.register(config.build()?)?;
        }
        Ok(())
    }

    pub fn probes(&self) -> &[Arc<dyn Probe>] {
        &self.probes
    }

    pub fn names(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
