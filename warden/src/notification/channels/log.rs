//! Log-only notification channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::NotificationChannel;
use crate::Result;
use crate::notification::events::{OutboundMessage, Severity};

/// Log channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Writes every message to the log at a level matching its severity.
pub struct LogChannel {
    config: LogConfig,
}

impl LogChannel {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let component = message.component.as_deref().unwrap_or("-");
        match message.severity {
            Severity::Info => info!(
                target: "warden::notification",
                component,
                to = %message.to,
                "{}\n{}",
                message.subject,
                message.body
            ),
            Severity::Warning => warn!(
                target: "warden::notification",
                component,
                to = %message.to,
                "{}\n{}",
                message.subject,
                message.body
            ),
            Severity::Critical => error!(
                target: "warden::notification",
                component,
                to = %message.to,
                "{}\n{}",
                message.subject,
                message.body
            ),
        }
        Ok(())
    }
}
