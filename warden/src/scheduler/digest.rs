//! Once-a-day digest timer.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::digest::DigestReport;
use crate::notification::{MessageKind, Notifier, Severity};
use crate::state::ComponentStore;
use crate::{Error, Result};

/// Digest settings.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Local time of day at which the digest is sent.
    pub time: NaiveTime,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
        }
    }
}

/// Next occurrence of `at` strictly after `now`, in `now`'s time zone.
///
/// A time that does not exist on a given day (spring-forward gap) is moved
/// one hour later; an ambiguous one (fall-back) resolves to the earlier
/// instant.
pub fn next_digest_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Result<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();

    for date in [Some(today), today.succ_opt()].into_iter().flatten() {
        let candidate = resolve_local(&tz, date.and_time(at))?;
        if candidate > *now {
            return Ok(candidate);
        }
    }

    Err(Error::Clock(format!("no digest time after {}", now.naive_local())))
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>> {
    if let Some(at) = tz.from_local_datetime(&naive).earliest() {
        return Ok(at);
    }
    tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
        .earliest()
        .ok_or_else(|| Error::Clock(format!("cannot resolve local time {}", naive)))
}

/// Sends the daily digest through the unthrottled notification path.
pub struct DigestScheduler {
    config: DigestConfig,
    store: ComponentStore,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    last_sent_on: Option<NaiveDate>,
}

impl DigestScheduler {
    pub fn new(
        config: DigestConfig,
        store: ComponentStore,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            clock,
            last_sent_on: None,
        }
    }

    /// Sleep until each digest time and send, until cancelled.
    ///
    /// Fails only if the next digest time cannot be computed.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(time = %self.config.time.format("%H:%M"), "Digest scheduler started");

        loop {
            let now = self.clock.now().with_timezone(&Local);
            let next = next_digest_after(&now, self.config.time)?;
            let wait = (next.clone() - now).to_std().unwrap_or_default();
            debug!(next = %next, wait_secs = wait.as_secs(), "Next digest scheduled");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            self.send_if_due(self.clock.now());
        }

        info!("Digest scheduler stopped");
        Ok(())
    }

    /// Send today's digest unless it has already gone out.
    ///
    /// Returns true if a digest was queued.
    pub fn send_if_due(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.with_timezone(&Local).date_naive();
        if self.last_sent_on == Some(today) {
            debug!(date = %today, "Digest already sent today");
            return false;
        }

        let report = DigestReport::from_snapshot(self.store.snapshot(now));
        let sent = self.notifier.send_unthrottled(
            MessageKind::Digest,
            Severity::Info,
            &report.subject(),
            &report.body(),
        );

        if sent {
            self.last_sent_on = Some(today);
            info!(date = %today, overall = %report.overall, "Daily digest sent");
        } else {
            warn!(date = %today, "Daily digest could not be queued");
        }
        sent
    }

    pub fn last_sent_on(&self) -> Option<NaiveDate> {
        self.last_sent_on
    }
}
