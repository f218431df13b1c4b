//! Outcome of a single probe run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one probe execution. Lives only for the tick that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub component: String,
    pub success: bool,
    pub detail: Option<String>,
    #[serde(with = "duration_millis")]
    pub latency: Duration,
    pub observed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(component: impl Into<String>, latency: Duration) -> Self {
        Self {
            component: component.into(),
            success: true,
            detail: None,
            latency,
            observed_at: Utc::now(),
        }
    }

    pub fn failure(component: impl Into<String>, detail: impl Into<String>, latency: Duration) -> Self {
        Self {
            component: component.into(),
            success: false,
            detail: Some(detail.into()),
            latency,
            observed_at: Utc::now(),
        }
    }

    /// Probe exceeded its deadline.
    pub fn timeout(component: impl Into<String>, latency: Duration) -> Self {
        Self::failure(component, "timeout", latency)
    }

    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }

    pub fn is_timeout(&self) -> bool {
        !self.success && self.detail.as_deref() == Some("timeout")
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
