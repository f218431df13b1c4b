//! Per-component supervision state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a supervised component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Last probe succeeded.
    #[default]
    Healthy,
    /// Failing, but no restart is currently pending.
    Degraded,
    /// A restart was just issued and has not been observed by a probe yet.
    Restarting,
    /// Failing inside the cooldown window of a previous restart.
    Cooldown,
}

impl Lifecycle {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Healthy => write!(f, "healthy"),
            Lifecycle::Degraded => write!(f, "degraded"),
            Lifecycle::Restarting => write!(f, "restarting"),
            Lifecycle::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Supervision state of one monitored component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentState {
    /// Stable identifier, e.g. `store` or `provider:gemini`.
    pub name: String,
    pub lifecycle: Lifecycle,
    /// Failures since the last success or restart.
    pub consecutive_failures: u32,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_restart_at: Option<DateTime<Utc>>,
    pub last_alert_at: Option<DateTime<Utc>>,
    /// False for advisory-only components that must never be restarted.
    pub restart_eligible: bool,
    /// Detail of the most recent failed probe.
    pub last_detail: Option<String>,
    /// Latency of the most recent probe in milliseconds.
    pub last_latency_ms: Option<u64>,
    /// Failed probes since the supervisor started.
    pub total_failures: u64,
    /// Restarts issued since the supervisor started.
    pub total_restarts: u64,
    /// A restart command has been dispatched and its outcome is pending.
    #[serde(skip)]
    pub(crate) restart_in_flight: bool,
}

impl ComponentState {
    pub fn new(name: impl Into<String>, restart_eligible: bool) -> Self {
        Self {
            name: name.into(),
            lifecycle: Lifecycle::Healthy,
            consecutive_failures: 0,
            last_probe_at: None,
            last_success_at: None,
            last_restart_at: None,
            last_alert_at: None,
            restart_eligible,
            last_detail: None,
            last_latency_ms: None,
            total_failures: 0,
            total_restarts: 0,
            restart_in_flight: false,
        }
    }

    /// Whether `now` falls inside the cooldown window of the last restart.
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        self.last_restart_at
            .is_some_and(|restarted| now.signed_duration_since(restarted) < cooldown)
    }

    /// Whether a restart command is outstanding.
    pub fn restart_in_flight(&self) -> bool {
        self.restart_in_flight
    }

    /// Check the lifecycle/counter invariant.
    pub fn is_consistent(&self) -> bool {
        match self.lifecycle {
            Lifecycle::Healthy => self.consecutive_failures == 0,
            _ => true,
        }
    }
}
