//! Operator notifications.
//!
//! Alerts, digests and system notices are rendered as [`OutboundMessage`]s
//! and handed to the [`Notifier`], which applies the per-component rate
//! limit and queues them for delivery over the configured channels
//! (email, webhook, log).

pub mod channels;
pub mod events;
pub mod rate_limit;
pub mod service;

pub use channels::{ChannelConfig, EmailConfig, LogConfig, NotificationChannel, WebhookConfig};
pub use events::{MessageKind, OutboundMessage, Severity};
pub use rate_limit::{AlertRateLimiter, AlertRecord};
pub use service::{DispatchWorker, Notifier, NotifierConfig, NotifierStats};
