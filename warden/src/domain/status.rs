//! Aggregate status view over all components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::{ComponentState, Lifecycle};

/// Overall status of the supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    /// Derive the overall status from component states.
    ///
    /// Any component mid-restart makes the service unhealthy; otherwise any
    /// degraded or cooling-down component makes it degraded.
    pub fn derive(components: &[ComponentState]) -> Self {
        let mut status = OverallStatus::Healthy;
        for component in components {
            match component.lifecycle {
                Lifecycle::Restarting => return OverallStatus::Unhealthy,
                Lifecycle::Degraded | Lifecycle::Cooldown => status = OverallStatus::Degraded,
                Lifecycle::Healthy => {}
            }
        }
        status
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Degraded => write!(f, "degraded"),
            OverallStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Read-only snapshot of every component, for status endpoints and the digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub overall: OverallStatus,
    pub components: Vec<ComponentState>,
}

impl StatusSnapshot {
    pub fn new(components: Vec<ComponentState>, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            overall: OverallStatus::derive(&components),
            components,
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentState> {
        self.components.iter().find(|c| c.name == name)
    }
}
