//! Daemon configuration.
//!
//! Settings come from a TOML file with `[supervisor]`, `[notification]`,
//! `[restart]`, `[[probes]]` and `[logging]` sections, followed by a small
//! set of environment overrides. See [`loader`] for the lookup order.

pub mod loader;

pub use loader::{ConfigSource, load, resolve_path};

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::notification::{ChannelConfig, NotifierConfig};
use crate::policy::PolicyConfig;
use crate::probe::ProbeConfig;
use crate::restart::RestartConfig;
use crate::scheduler::{DigestConfig, SchedulerConfig};
use crate::{Error, Result};

/// Format of `digest_time`.
pub const DIGEST_TIME_FORMAT: &str = "%H:%M";

/// Upper bound for every `*_secs` setting (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub supervisor: SupervisorSettings,
    pub notification: NotificationSettings,
    pub restart: RestartConfig,
    pub probes: Vec<ProbeConfig>,
    pub logging: LogSettings,
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub tick_interval_secs: u64,
    /// Default per-probe deadline; must be shorter than the tick interval.
    pub probe_timeout_secs: u64,
    pub failure_threshold: u32,
    pub restart_cooldown_secs: u64,
    pub alert_rate_limit_secs: u64,
    /// Local time of day, `HH:MM`.
    pub digest_time: String,
    pub notify_on_recovery: bool,
    pub status_file: Option<PathBuf>,
    pub shutdown_timeout_secs: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            probe_timeout_secs: 30,
            failure_threshold: 3,
            restart_cooldown_secs: 600,
            alert_rate_limit_secs: 3600,
            digest_time: "08:00".to_string(),
            notify_on_recovery: true,
            status_file: None,
            shutdown_timeout_secs: 30,
        }
    }
}

/// `[notification]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub operator_address: String,
    pub subject_prefix: String,
    pub queue_capacity: usize,
    pub send_timeout_secs: u64,
    pub channels: Vec<ChannelConfig>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            operator_address: String::new(),
            subject_prefix: "[warden]".to_string(),
            queue_capacity: 256,
            send_timeout_secs: 30,
            channels: Vec::new(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: String,
    /// Filter directive; falls back to `RUST_LOG`, then the built-in default.
    pub filter: Option<String>,
    /// Write JSON lines to the log file instead of text.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            filter: None,
            json: false,
        }
    }
}

impl WardenConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `WARDEN_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("WARDEN_TICK_INTERVAL_SECS") {
            self.supervisor.tick_interval_secs = parse_env("WARDEN_TICK_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("WARDEN_FAILURE_THRESHOLD") {
            self.supervisor.failure_threshold = parse_env("WARDEN_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("WARDEN_OPERATOR_ADDRESS")
            && !value.trim().is_empty()
        {
            self.notification.operator_address = value.trim().to_string();
        }
        if let Some(value) = lookup("WARDEN_LOG_FILTER")
            && !value.trim().is_empty()
        {
            self.logging.filter = Some(value.trim().to_string());
        }
        Ok(())
    }

    /// Reject configurations the supervisor cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.supervisor;
        if s.tick_interval_secs == 0 {
            return Err(Error::config("supervisor.tick_interval_secs must be greater than 0"));
        }
        if s.probe_timeout_secs == 0 || s.probe_timeout_secs >= s.tick_interval_secs {
            return Err(Error::config(format!(
                "supervisor.probe_timeout_secs ({}) must be between 1 and tick_interval_secs ({})",
                s.probe_timeout_secs, s.tick_interval_secs
            )));
        }
        if s.failure_threshold == 0 {
            return Err(Error::config("supervisor.failure_threshold must be at least 1"));
        }
        if s.shutdown_timeout_secs == 0 {
            return Err(Error::config("supervisor.shutdown_timeout_secs must be greater than 0"));
        }
        for (key, value) in [
            ("supervisor.tick_interval_secs", s.tick_interval_secs),
            ("supervisor.restart_cooldown_secs", s.restart_cooldown_secs),
            ("supervisor.alert_rate_limit_secs", s.alert_rate_limit_secs),
            ("supervisor.shutdown_timeout_secs", s.shutdown_timeout_secs),
            ("notification.send_timeout_secs", self.notification.send_timeout_secs),
        ] {
            check_max(key, value)?;
        }
        self.digest_time()?;

        let mut names = HashSet::new();
        for probe in &self.probes {
            let name = probe.name().trim();
            if name.is_empty() {
                return Err(Error::config(format!("a {} probe has an empty name", probe.kind())));
            }
            if !names.insert(name) {
                return Err(Error::config(format!("duplicate probe name '{}'", name)));
            }
            if let Some(timeout) = probe.timeout_secs()
                && (timeout == 0 || timeout >= s.tick_interval_secs)
            {
                return Err(Error::config(format!(
                    "probe '{}' timeout_secs ({}) must be between 1 and tick_interval_secs ({})",
                    name, timeout, s.tick_interval_secs
                )));
            }
        }

        let needs_address = self
            .notification
            .channels
            .iter()
            .any(|c| c.is_enabled() && c.uses_operator_address());
        if needs_address && self.notification.operator_address.trim().is_empty() {
            return Err(Error::config(
                "notification.operator_address is required when an email channel is enabled",
            ));
        }

        Ok(())
    }

    /// Parsed `digest_time`.
    pub fn digest_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.supervisor.digest_time.trim(), DIGEST_TIME_FORMAT).map_err(
            |e| {
                Error::config(format!(
                    "supervisor.digest_time '{}' is not HH:MM: {}",
                    self.supervisor.digest_time, e
                ))
            },
        )
    }

    pub fn policy_config(&self) -> Result<PolicyConfig> {
        Ok(PolicyConfig {
            failure_threshold: self.supervisor.failure_threshold,
            restart_cooldown: secs(
                "supervisor.restart_cooldown_secs",
                self.supervisor.restart_cooldown_secs,
            )?,
            notify_on_recovery: self.supervisor.notify_on_recovery,
        })
    }

    pub fn notifier_config(&self) -> Result<NotifierConfig> {
        Ok(NotifierConfig {
            operator_address: self.notification.operator_address.clone(),
            subject_prefix: self.notification.subject_prefix.clone(),
            rate_limit_window: secs(
                "supervisor.alert_rate_limit_secs",
                self.supervisor.alert_rate_limit_secs,
            )?,
            queue_capacity: self.notification.queue_capacity,
            send_timeout: Duration::from_secs(self.notification.send_timeout_secs),
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.supervisor.tick_interval_secs),
            probe_timeout: Duration::from_secs(self.supervisor.probe_timeout_secs),
            status_file: self.supervisor.status_file.clone(),
        }
    }

    pub fn digest_config(&self) -> Result<DigestConfig> {
        Ok(DigestConfig {
            time: self.digest_time()?,
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.supervisor.shutdown_timeout_secs)
    }
}

fn check_max(key: &str, value: u64) -> Result<()> {
    if value > MAX_DURATION_SECS {
        return Err(Error::config(format!(
            "{} ({}) must not exceed {}",
            key, value, MAX_DURATION_SECS
        )));
    }
    Ok(())
}

fn secs(key: &str, value: u64) -> Result<chrono::Duration> {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| Error::config(format!("{} ({}) is out of range", key, value)))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{}='{}': {}", name, value, e)))
}
