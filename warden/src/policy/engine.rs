//! Policy engine actor.
//!
//! The engine is the only writer of component state. Probe results and
//! restart outcomes arrive on one inbox and are applied strictly in arrival
//! order; the resulting restarts and alerts are handed off without waiting
//! on any I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::rules::{Action, FailurePolicy};
use crate::clock::Clock;
use crate::domain::ProbeResult;
use crate::notification::Notifier;
use crate::restart::{RestartOutcome, RestartRequest};
use crate::state::ComponentStore;
use crate::{Error, Result};

const INBOX_CAPACITY: usize = 256;

/// Messages accepted by the engine.
#[derive(Debug)]
pub enum EngineMessage {
    Probe(ProbeResult),
    RestartOutcome {
        component: String,
        outcome: RestartOutcome,
    },
    /// Acknowledged once every earlier message has been applied and no
    /// restart is outstanding.
    Flush(oneshot::Sender<()>),
}

/// Sending side of the engine inbox.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Submit a probe result.
    pub async fn submit(&self, result: ProbeResult) -> Result<()> {
        self.tx
            .send(EngineMessage::Probe(result))
            .await
            .map_err(|_| Error::Other("policy engine stopped".to_string()))
    }

    /// Report the outcome of a restart. Dropped silently if the engine has
    /// already stopped.
    pub async fn restart_outcome(&self, component: &str, outcome: RestartOutcome) {
        let message = EngineMessage::RestartOutcome {
            component: component.to_string(),
            outcome,
        };
        if self.tx.send(message).await.is_err() {
            debug!(component = %component, "Policy engine stopped before restart outcome");
        }
    }

    /// Wait until everything submitted so far has been applied, including
    /// the outcome of any restart it triggered.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(EngineMessage::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

pub struct PolicyEngine {
    rx: mpsc::Receiver<EngineMessage>,
    store: ComponentStore,
    policy: FailurePolicy,
    notifier: Notifier,
    restarts: mpsc::Sender<RestartRequest>,
    clock: Arc<dyn Clock>,
    restarts_in_flight: usize,
    pending_flushes: Vec<oneshot::Sender<()>>,
}

impl PolicyEngine {
    pub fn new(
        store: ComponentStore,
        policy: FailurePolicy,
        notifier: Notifier,
        restarts: mpsc::Sender<RestartRequest>,
        clock: Arc<dyn Clock>,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let engine = Self {
            rx,
            store,
            policy,
            notifier,
            restarts,
            clock,
            restarts_in_flight: 0,
            pending_flushes: Vec::new(),
        };
        (engine, EngineHandle { tx })
    }

    /// Apply messages until every [`EngineHandle`] has been dropped.
    pub async fn run(mut self) {
        info!(
            threshold = self.policy.config().failure_threshold,
            cooldown_secs = self.policy.config().restart_cooldown.num_seconds(),
            "Policy engine started"
        );

        while let Some(message) = self.rx.recv().await {
            match message {
                EngineMessage::Probe(result) => self.apply_probe(&result),
                EngineMessage::RestartOutcome { component, outcome } => {
                    self.apply_restart_outcome(&component, &outcome)
                }
                EngineMessage::Flush(done) => {
                    if self.restarts_in_flight == 0 {
                        let _ = done.send(());
                    } else {
                        self.pending_flushes.push(done);
                    }
                }
            }
        }

        for done in self.pending_flushes.drain(..) {
            let _ = done.send(());
        }
        info!("Policy engine stopped");
    }

    fn apply_probe(&mut self, result: &ProbeResult) {
        let now = self.clock.now();
        let (actions, lifecycle, failures) =
            self.store.with_component(&result.component, |state| {
                let before = state.lifecycle;
                let actions = self.policy.on_probe_result(state, result, now);
                if before != state.lifecycle {
                    info!(
                        component = %state.name,
                        from = %before,
                        to = %state.lifecycle,
                        consecutive_failures = state.consecutive_failures,
                        "Component lifecycle changed"
                    );
                }
                (actions, state.lifecycle, state.consecutive_failures)
            });

        debug!(
            component = %result.component,
            success = result.success,
            detail = result.detail.as_deref().unwrap_or(""),
            latency_ms = result.latency.as_millis() as u64,
            lifecycle = %lifecycle,
            consecutive_failures = failures,
            "Applied probe result"
        );

        self.execute(&result.component, actions, now);
    }

    fn apply_restart_outcome(&mut self, component: &str, outcome: &RestartOutcome) {
        let now = self.clock.now();
        let actions = self.store.with_component(component, |state| {
            self.policy.on_restart_outcome(state, outcome, now)
        });

        match outcome {
            RestartOutcome::Succeeded => info!(component = %component, "Component restarted"),
            RestartOutcome::Failed(detail) => {
                warn!(component = %component, error = %detail, "Restart dispatch failed; will retry on next failure")
            }
        }

        self.execute(component, actions, now);
        self.restart_settled();
    }

    fn execute(&mut self, component: &str, actions: Vec<Action>, now: DateTime<Utc>) {
        for action in actions {
            match action {
                Action::Restart => self.dispatch_restart(component, now),
                Action::Alert {
                    severity,
                    subject,
                    body,
                } => {
                    if self.notifier.notify(component, severity, &subject, &body, now) {
                        self.store
                            .with_component(component, |state| state.last_alert_at = Some(now));
                        info!(component = %component, %severity, subject = %subject, "Alert sent");
                    } else {
                        debug!(component = %component, subject = %subject, "Alert not sent");
                    }
                }
            }
        }
    }

    fn dispatch_restart(&mut self, component: &str, now: DateTime<Utc>) {
        let request = RestartRequest {
            component: component.to_string(),
        };
        match self.restarts.try_send(request) {
            Ok(()) => {
                self.restarts_in_flight += 1;
                info!(component = %component, "Restart requested");
            }
            Err(e) => {
                let detail = match e {
                    mpsc::error::TrySendError::Full(_) => "restart queue full",
                    mpsc::error::TrySendError::Closed(_) => "restart worker unavailable",
                };
                warn!(component = %component, error = detail, "Could not dispatch restart");
                let actions = self.store.with_component(component, |state| {
                    self.policy.on_restart_outcome(
                        state,
                        &RestartOutcome::Failed(detail.to_string()),
                        now,
                    )
                });
                self.execute(component, actions, now);
            }
        }
    }

    fn restart_settled(&mut self) {
        self.restarts_in_flight = self.restarts_in_flight.saturating_sub(1);
        if self.restarts_in_flight == 0 {
            for done in self.pending_flushes.drain(..) {
                let _ = done.send(());
            }
        }
    }
}
