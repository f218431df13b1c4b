//! Notification messages and their severity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational: digests, recoveries, startup/shutdown.
    #[default]
    Info,
    /// A component is failing but no restart was issued.
    Warning,
    /// A restart was issued or failed.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What kind of message is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Per-component alert, subject to rate limiting.
    Alert,
    /// Scheduled daily digest.
    Digest,
    /// Supervisor startup/shutdown notice.
    System,
}

/// A message ready for delivery to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient address.
    pub to: String,
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    pub kind: MessageKind,
    /// Component the message is about, if any.
    pub component: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        severity: Severity,
        kind: MessageKind,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            severity,
            kind,
            component: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}
