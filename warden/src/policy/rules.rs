//! Failure policy.
//!
//! Pure state transitions: each function mutates one [`ComponentState`] and
//! returns the side effects the engine should carry out. Nothing here does
//! I/O or reads the clock.

use chrono::{DateTime, Utc};

use crate::domain::{ComponentState, Lifecycle, ProbeResult};
use crate::notification::Severity;
use crate::restart::RestartOutcome;

/// Policy knobs.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Consecutive failures that trigger a restart.
    pub failure_threshold: u32,
    /// Minimum time between two restarts of the same component.
    pub restart_cooldown: chrono::Duration,
    /// Send an informational alert when an alerted component recovers.
    pub notify_on_recovery: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            restart_cooldown: chrono::Duration::minutes(10),
            notify_on_recovery: true,
        }
    }
}

/// Side effect requested by the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Dispatch a restart of the component.
    Restart,
    /// Send a rate-limited alert about the component.
    Alert {
        severity: Severity,
        subject: String,
        body: String,
    },
}

impl Action {
    fn alert(severity: Severity, subject: String, body: String) -> Self {
        Self::Alert {
            severity,
            subject,
            body,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailurePolicy {
    config: PolicyConfig,
}

impl FailurePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Apply one probe result.
    pub fn on_probe_result(
        &self,
        state: &mut ComponentState,
        result: &ProbeResult,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        state.last_probe_at = Some(result.observed_at);
        state.last_latency_ms = Some(result.latency.as_millis() as u64);

        if result.success {
            return self.on_success(state, now);
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.total_failures += 1;
        let detail = result.detail.clone().unwrap_or_else(|| "failure".to_string());
        state.last_detail = Some(detail.clone());

        let in_cooldown = state.in_cooldown(now, self.config.restart_cooldown);

        if state.consecutive_failures < self.config.failure_threshold {
            state.lifecycle = if in_cooldown {
                Lifecycle::Cooldown
            } else {
                Lifecycle::Degraded
            };
            return Vec::new();
        }

        if !state.restart_eligible {
            state.lifecycle = Lifecycle::Degraded;
            return vec![Action::alert(
                Severity::Warning,
                format!("{} is failing", state.name),
                format!(
                    "{} has failed {} consecutive checks. It is advisory-only and will not be restarted.\n\nLast failure: {}",
                    state.name, state.consecutive_failures, detail
                ),
            )];
        }

        if in_cooldown {
            state.lifecycle = Lifecycle::Cooldown;
            return vec![Action::alert(
                Severity::Warning,
                format!("{} still failing after restart", state.name),
                format!(
                    "{} has failed {} consecutive checks since it was restarted at {}. No further restart will be issued until the cooldown ends.\n\nLast failure: {}",
                    state.name,
                    state.consecutive_failures,
                    format_time(state.last_restart_at),
                    detail
                ),
            )];
        }

        state.lifecycle = Lifecycle::Degraded;
        if state.restart_in_flight {
            return Vec::new();
        }
        state.restart_in_flight = true;
        vec![Action::Restart]
    }

    /// Apply the outcome of a dispatched restart.
    pub fn on_restart_outcome(
        &self,
        state: &mut ComponentState,
        outcome: &RestartOutcome,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        state.restart_in_flight = false;

        match outcome {
            RestartOutcome::Succeeded => {
                let failures = state.consecutive_failures;
                state.lifecycle = Lifecycle::Restarting;
                state.last_restart_at = Some(now);
                state.consecutive_failures = 0;
                state.total_restarts += 1;
                vec![Action::alert(
                    Severity::Critical,
                    format!("{} restarted", state.name),
                    format!(
                        "{} was restarted after {} consecutive failed checks.\n\nLast failure: {}",
                        state.name,
                        failures,
                        state.last_detail.as_deref().unwrap_or("unknown")
                    ),
                )]
            }
            RestartOutcome::Failed(detail) => vec![Action::alert(
                Severity::Critical,
                format!("restart of {} failed", state.name),
                format!(
                    "{} has failed {} consecutive checks and the restart could not be issued: {}\n\nThe restart will be retried on the next failed check.",
                    state.name, state.consecutive_failures, detail
                ),
            )],
        }
    }

    fn on_success(&self, state: &mut ComponentState, now: DateTime<Utc>) -> Vec<Action> {
        let was = state.lifecycle;
        let alerted_since_success = match (state.last_alert_at, state.last_success_at) {
            (Some(alerted), Some(succeeded)) => alerted > succeeded,
            (Some(_), None) => true,
            (None, _) => false,
        };

        state.consecutive_failures = 0;
        state.lifecycle = Lifecycle::Healthy;
        state.last_success_at = Some(now);

        if self.config.notify_on_recovery && !was.is_healthy() && alerted_since_success {
            return vec![Action::alert(
                Severity::Info,
                format!("{} recovered", state.name),
                format!("{} is healthy again (was {}).", state.name, was),
            )];
        }
        Vec::new()
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn policy() -> FailurePolicy {
        FailurePolicy::default()
    }

    fn fail(name: &str) -> ProbeResult {
        ProbeResult::failure(name, "connection refused", Duration::from_millis(5))
    }

    fn ok(name: &str) -> ProbeResult {
        ProbeResult::success(name, Duration::from_millis(5))
    }

    fn is_alert(actions: &[Action]) -> bool {
        actions.iter().any(|a| matches!(a, Action::Alert { .. }))
    }

    #[test]
    fn test_below_threshold_degrades() {
        let policy = policy();
        let mut state = ComponentState::new("store", true);
        let now = Utc::now();

        assert!(policy.on_probe_result(&mut state, &fail("store"), now).is_empty());
        assert_eq!(state.lifecycle, Lifecycle::Degraded);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.last_detail.as_deref(), Some("connection refused"));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_threshold_requests_restart_once() {
        let policy = policy();
        let mut state = ComponentState::new("store", true);
        let now = Utc::now();

        policy.on_probe_result(&mut state, &fail("store"), now);
        policy.on_probe_result(&mut state, &fail("store"), now);
        let actions = policy.on_probe_result(&mut state, &fail("store"), now);
        assert_eq!(actions, vec![Action::Restart]);
        assert!(state.restart_in_flight());

        // Outcome still pending: no second dispatch.
        let actions = policy.on_probe_result(&mut state, &fail("store"), now);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_successful_restart_resets_counter() {
        let policy = policy();
        let mut state = ComponentState::new("store", true);
        let now = Utc::now();
        state.consecutive_failures = 3;
        state.restart_in_flight = true;

        let actions = policy.on_restart_outcome(&mut state, &RestartOutcome::Succeeded, now);
        assert_eq!(state.lifecycle, Lifecycle::Restarting);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_restart_at, Some(now));
        assert_eq!(state.total_restarts, 1);
        assert!(!state.restart_in_flight());
        assert!(matches!(
            actions.as_slice(),
            [Action::Alert { severity: Severity::Critical, .. }]
        ));
    }

    #[test]
    fn test_failed_restart_keeps_counter() {
        let policy = policy();
        let mut state = ComponentState::new("store", true);
        let now = Utc::now();
        for _ in 0..3 {
            policy.on_probe_result(&mut state, &fail("store"), now);
        }

        let outcome = RestartOutcome::Failed("docker unreachable".to_string());
        policy.on_restart_outcome(&mut state, &outcome, now);
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.lifecycle, Lifecycle::Degraded);
        assert!(state.last_restart_at.is_none());

        // Next failing tick retries.
        let actions = policy.on_probe_result(&mut state, &fail("store"), now);
        assert_eq!(actions, vec![Action::Restart]);
    }

    #[test]
    fn test_cooldown_blocks_second_restart() {
        let policy = policy();
        let mut state = ComponentState::new("store", true);
        let now = Utc::now();
        for _ in 0..3 {
            policy.on_probe_result(&mut state, &fail("store"), now);
        }
        policy.on_restart_outcome(&mut state, &RestartOutcome::Succeeded, now);

        let later = now + chrono::Duration::minutes(1);
        assert!(policy.on_probe_result(&mut state, &fail("store"), later).is_empty());
        assert_eq!(state.lifecycle, Lifecycle::Cooldown);
        policy.on_probe_result(&mut state, &fail("store"), later);
        let actions = policy.on_probe_result(&mut state, &fail("store"), later);
        assert!(!actions.contains(&Action::Restart));
        assert!(is_alert(&actions));
        assert_eq!(state.lifecycle, Lifecycle::Cooldown);

        // Once the window has passed the next threshold crossing restarts.
        let after = now + chrono::Duration::minutes(11);
        let actions = policy.on_probe_result(&mut state, &fail("store"), after);
        assert_eq!(actions, vec![Action::Restart]);
    }

    #[test]
    fn test_advisory_component_never_restarts() {
        let policy = policy();
        let mut state = ComponentState::new("connectivity", false);
        let now = Utc::now();
        for _ in 0..10 {
            let actions = policy.on_probe_result(&mut state, &fail("connectivity"), now);
            assert!(!actions.contains(&Action::Restart));
        }
        assert_eq!(state.lifecycle, Lifecycle::Degraded);
        assert_eq!(state.consecutive_failures, 10);
    }

    #[test]
    fn test_alternating_results_never_reach_threshold() {
        let policy = policy();
        let mut state = ComponentState::new("provider:gemini", true);
        let now = Utc::now();
        let mut counters = Vec::new();
        for result in [fail("p"), ok("p"), fail("p"), fail("p")] {
            let actions = policy.on_probe_result(&mut state, &result, now);
            assert!(!actions.contains(&Action::Restart));
            counters.push(state.consecutive_failures);
        }
        assert_eq!(counters, vec![1, 0, 1, 2]);
    }

    #[test]
    fn test_success_mid_cooldown_is_healthy() {
        let policy = policy();
        let mut state = ComponentState::new("broker", true);
        let now = Utc::now();
        state.last_restart_at = Some(now);
        state.lifecycle = Lifecycle::Cooldown;
        state.consecutive_failures = 2;

        policy.on_probe_result(&mut state, &ok("broker"), now);
        assert_eq!(state.lifecycle, Lifecycle::Healthy);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_success_at, Some(now));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_recovery_alert_only_after_alert() {
        let policy = policy();
        let now = Utc::now();

        let mut quiet = ComponentState::new("web", true);
        policy.on_probe_result(&mut quiet, &fail("web"), now);
        assert!(policy.on_probe_result(&mut quiet, &ok("web"), now).is_empty());

        let mut alerted = ComponentState::new("web", true);
        policy.on_probe_result(&mut alerted, &fail("web"), now);
        alerted.last_alert_at = Some(now);
        let later = now + chrono::Duration::minutes(5);
        let actions = policy.on_probe_result(&mut alerted, &ok("web"), later);
        assert!(matches!(
            actions.as_slice(),
            [Action::Alert { severity: Severity::Info, .. }]
        ));
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let policy = policy();
        let mut state = ComponentState::new("store", true);
        let timeout = ProbeResult::timeout("store", Duration::from_secs(30));
        policy.on_probe_result(&mut state, &timeout, Utc::now());
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.last_detail.as_deref(), Some("timeout"));
    }
}
