//! Notifier and its dispatch worker.
//!
//! The [`Notifier`] is the only way alerts leave the supervisor:
//! - Per-component alerts go through the [`AlertRateLimiter`] first
//! - Digest and system messages bypass the limiter
//! - Accepted messages are queued on a bounded channel and delivered by the
//!   [`DispatchWorker`] so callers never wait on SMTP or HTTP
//!
//! Delivery failures are logged and counted, never retried. A message that
//! does not fit in the queue is dropped with a warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::channels::NotificationChannel;
use super::events::{MessageKind, OutboundMessage, Severity};
use super::rate_limit::AlertRateLimiter;

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Where every message is addressed.
    pub operator_address: String,
    /// Prepended to each subject, e.g. `[warden]`.
    pub subject_prefix: String,
    /// Minimum time between two alerts for the same component.
    pub rate_limit_window: chrono::Duration,
    /// Capacity of the dispatch queue.
    pub queue_capacity: usize,
    /// Upper bound on a single channel send.
    pub send_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            operator_address: String::new(),
            subject_prefix: "[warden]".to_string(),
            rate_limit_window: chrono::Duration::hours(1),
            queue_capacity: 256,
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    /// Messages accepted onto the dispatch queue.
    pub accepted: u64,
    /// Alerts rejected by the rate limiter.
    pub suppressed: u64,
    /// Messages dropped because the queue was full or closed.
    pub dropped: u64,
    /// Successful channel deliveries.
    pub delivered: u64,
    /// Failed or timed out channel deliveries.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> NotifierStats {
        NotifierStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

enum DispatchMessage {
    Deliver(OutboundMessage),
    Flush(oneshot::Sender<()>),
}

struct NotifierInner {
    config: NotifierConfig,
    limiter: AlertRateLimiter,
    tx: mpsc::Sender<DispatchMessage>,
    counters: Arc<Counters>,
}

/// Handle for sending operator notifications.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    /// Create a notifier and the worker that delivers its messages.
    ///
    /// The worker stops once every clone of the notifier has been dropped
    /// and the queue is drained.
    pub fn new(
        config: NotifierConfig,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = DispatchWorker {
            rx,
            channels,
            send_timeout: config.send_timeout,
            counters: counters.clone(),
        };
        let inner = NotifierInner {
            limiter: AlertRateLimiter::new(config.rate_limit_window),
            config,
            tx,
            counters,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            worker,
        )
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.inner.config
    }

    /// Send a per-component alert, subject to the rate limit.
    ///
    /// Returns true only if the alert was accepted for delivery. A suppressed
    /// or dropped alert leaves the component's window untouched.
    pub fn notify(
        &self,
        component: &str,
        severity: Severity,
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut message = self
            .message(MessageKind::Alert, severity, subject, body)
            .for_component(component);
        message.timestamp = now;

        let mut suppressed = true;
        let accepted = self.inner.limiter.try_acquire_with(component, now, || {
            suppressed = false;
            self.enqueue(message)
        });

        if suppressed {
            self.inner.counters.suppressed.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Send a message that is not rate limited (digests, system notices).
    pub fn send_unthrottled(
        &self,
        kind: MessageKind,
        severity: Severity,
        subject: &str,
        body: &str,
    ) -> bool {
        let message = self.message(kind, severity, subject, body);
        self.enqueue(message)
    }

    /// Wait until every message queued before this call has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.tx.send(DispatchMessage::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// When the last alert for `component` was accepted.
    pub fn last_sent_at(&self, component: &str) -> Option<DateTime<Utc>> {
        self.inner.limiter.last_sent_at(component)
    }

    pub fn stats(&self) -> NotifierStats {
        self.inner.counters.snapshot()
    }

    fn message(
        &self,
        kind: MessageKind,
        severity: Severity,
        subject: &str,
        body: &str,
    ) -> OutboundMessage {
        let prefix = self.inner.config.subject_prefix.trim();
        let subject = if prefix.is_empty() {
            subject.to_string()
        } else {
            format!("{} {}", prefix, subject)
        };
        OutboundMessage::new(
            self.inner.config.operator_address.clone(),
            subject,
            body,
            severity,
            kind,
        )
    }

    fn enqueue(&self, message: OutboundMessage) -> bool {
        match self.inner.tx.try_send(DispatchMessage::Deliver(message)) {
            Ok(()) => {
                self.inner.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(DispatchMessage::Deliver(message))) => {
                self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(subject = %message.subject, "Notification queue full, dropping message");
                false
            }
            Err(_) => {
                self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Notification worker stopped, dropping message");
                false
            }
        }
    }
}

/// Delivers queued messages to every enabled channel.
pub struct DispatchWorker {
    rx: mpsc::Receiver<DispatchMessage>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    send_timeout: Duration,
    counters: Arc<Counters>,
}

impl DispatchWorker {
    pub async fn run(mut self) {
        let enabled = self.channels.iter().filter(|c| c.is_enabled()).count();
        info!(channels = enabled, "Notification dispatch worker started");

        while let Some(message) = self.rx.recv().await {
            match message {
                DispatchMessage::Deliver(message) => self.deliver(&message).await,
                DispatchMessage::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        info!("Notification dispatch worker stopped");
    }

    async fn deliver(&self, message: &OutboundMessage) {
        let sends = self
            .channels
            .iter()
            .filter(|channel| channel.is_enabled())
            .map(|channel| async move {
                let result = tokio::time::timeout(self.send_timeout, channel.send(message)).await;
                (channel.channel_type(), result)
            });

        for (channel, result) in join_all(sends).await {
            match result {
                Ok(Ok(())) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(channel, subject = %message.subject, "Notification delivered");
                }
                Ok(Err(e)) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(channel, subject = %message.subject, error = %e, "Notification delivery failed");
                }
                Err(_) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        channel,
                        subject = %message.subject,
                        timeout_secs = self.send_timeout.as_secs(),
                        "Notification delivery timed out"
                    );
                }
            }
        }
    }
}
