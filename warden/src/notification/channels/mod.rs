//! Delivery channels: email through sendmail, JSON webhooks, and the log.

mod email;
mod log;
mod webhook;

pub use email::{EmailChannel, EmailConfig};
pub use log::{LogChannel, LogConfig};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::OutboundMessage;
use crate::Result;

/// A way of reaching the operator.
///
/// `send` may fail; the dispatcher logs the error and moves on, so
/// implementations should not retry internally.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short name used in logs, e.g. `"email"`.
    fn channel_type(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// One entry of `[[notification.channels]]`, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Email(EmailConfig),
    Webhook(WebhookConfig),
    Log(LogConfig),
}

impl ChannelConfig {
    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Webhook(_) => "webhook",
            Self::Log(_) => "log",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Email(c) => c.enabled,
            Self::Webhook(c) => c.enabled,
            Self::Log(c) => c.enabled,
        }
    }

    /// Whether this channel delivers to the operator address.
    pub fn uses_operator_address(&self) -> bool {
        matches!(self, Self::Email(_))
    }

    /// Build the channel described by this configuration.
    pub fn build(&self) -> Result<Arc<dyn NotificationChannel>> {
        Ok(match self {
            Self::Email(c) => Arc::new(EmailChannel::new(c.clone())),
            Self::Webhook(c) => Arc::new(WebhookChannel::new(c.clone())?),
            Self::Log(c) => Arc::new(LogChannel::new(c.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_tagged_by_type() {
        let config: ChannelConfig = toml::from_str(
            r#"
            type = "webhook"
            enabled = true
            url = "https://hooks.example.com/warden"
            "#,
        )
        .unwrap();
        assert_eq!(config.channel_type(), "webhook");
        assert!(config.is_enabled());
        assert!(!config.uses_operator_address());
    }

    #[test]
    fn test_build_log_channel() {
        let channel = ChannelConfig::Log(LogConfig::default()).build().unwrap();
        assert_eq!(channel.channel_type(), "log");
        assert!(channel.is_enabled());
    }
}
