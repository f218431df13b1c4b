//! Fixed-interval probe scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::StatusSnapshot;
use crate::policy::EngineHandle;
use crate::probe::{Probe, run_probe};
use crate::state::ComponentStore;
use crate::{Error, Result};

/// Probe scheduling settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Default deadline for probes without their own timeout.
    pub probe_timeout: Duration,
    /// Where to write the JSON status snapshot after each tick.
    pub status_file: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(30),
            status_file: None,
        }
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Probes interrupted by shutdown; their results are discarded.
    pub cancelled: usize,
}

/// Runs every registered probe once per tick and feeds the results to the
/// policy engine.
pub struct ProbeScheduler {
    config: SchedulerConfig,
    probes: Vec<Arc<dyn Probe>>,
    engine: EngineHandle,
    store: ComponentStore,
    clock: Arc<dyn Clock>,
}

impl ProbeScheduler {
    pub fn new(
        config: SchedulerConfig,
        probes: Vec<Arc<dyn Probe>>,
        engine: EngineHandle,
        store: ComponentStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            probes,
            engine,
            store,
            clock,
        }
    }

    /// Tick until cancelled.
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// delays the next one instead of bunching ticks together.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.config.tick_interval.is_zero() {
            return Err(Error::Other("tick interval must be greater than zero".to_string()));
        }

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            probes = self.probes.len(),
            interval_secs = self.config.tick_interval.as_secs(),
            "Probe scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let summary = self.tick(&cancel).await;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                cancelled = summary.cancelled,
                "Tick complete"
            );

            // Also written for the tick that shutdown interrupted.
            if self.config.status_file.is_some() {
                self.engine.flush().await;
                self.write_status().await;
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        info!("Probe scheduler stopped");
        Ok(())
    }

    /// Run a single tick and wait until the engine has applied every result.
    pub async fn run_once(&self, cancel: &CancellationToken) -> TickSummary {
        let summary = self.tick(cancel).await;
        self.engine.flush().await;
        self.write_status().await;
        summary
    }

    async fn write_status(&self) {
        let Some(path) = &self.config.status_file else {
            return;
        };
        let snapshot = self.store.snapshot(self.clock.now());
        if let Err(e) = write_status_file(path, &snapshot).await {
            warn!(path = %path.display(), error = %e, "Failed to write status file");
        }
    }

    /// Run all probes concurrently, forwarding each result as it completes.
    pub async fn tick(&self, cancel: &CancellationToken) -> TickSummary {
        let mut set = JoinSet::new();
        for probe in &self.probes {
            let probe = probe.clone();
            let cancel = cancel.clone();
            let clock = self.clock.clone();
            let timeout = self.config.probe_timeout;
            set.spawn(async move { run_probe(probe, timeout, clock.as_ref(), &cancel).await });
        }

        let mut summary = TickSummary::default();
        while let Some(joined) = set.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Probe task failed to complete");
                    continue;
                }
            };

            if cancel.is_cancelled() && result.detail.as_deref() == Some("cancelled") {
                debug!(component = %result.component, "Discarding cancelled probe result");
                summary.cancelled += 1;
                continue;
            }

            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }

            if let Err(e) = self.engine.submit(result).await {
                warn!(error = %e, "Dropping probe result");
            }
        }
        summary
    }
}

/// Write `snapshot` as pretty JSON, replacing the file atomically.
pub async fn write_status_file(path: &Path, snapshot: &StatusSnapshot) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use tokio::sync::mpsc;

    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::Lifecycle;
    use crate::notification::{Notifier, NotifierConfig};
    use crate::policy::{FailurePolicy, PolicyEngine};
    use crate::testing::FnProbe;

    fn scheduler(
        probes: Vec<Arc<dyn Probe>>,
        config: SchedulerConfig,
    ) -> (ProbeScheduler, ComponentStore) {
        let store = ComponentStore::new();
        let (notifier, worker) = Notifier::new(NotifierConfig::default(), Vec::new());
        tokio::spawn(worker.run());
        let (restart_tx, _restart_rx) = mpsc::channel(8);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (engine, handle) = PolicyEngine::new(
            store.clone(),
            FailurePolicy::default(),
            notifier,
            restart_tx,
            clock.clone(),
        );
        tokio::spawn(engine.run());
        (
            ProbeScheduler::new(config, probes, handle, store.clone(), clock),
            store,
        )
    }

    #[tokio::test]
    async fn test_run_once_applies_all_results() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(FnProbe::new("web", || async { Ok(()) })),
            Arc::new(FnProbe::new("store", || async {
                Err(Error::probe("connection refused"))
            })),
        ];
        let (scheduler, store) = scheduler(probes, SchedulerConfig::default());

        let summary = scheduler.run_once(&CancellationToken::new()).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.get("web").unwrap().lifecycle, Lifecycle::Healthy);
        assert_eq!(store.get("store").unwrap().lifecycle, Lifecycle::Degraded);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out_without_blocking_others() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(FnProbe::new("provider:slow", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })),
            Arc::new(FnProbe::new("broker", || async { Ok(()) })),
        ];
        let (scheduler, store) = scheduler(
            probes,
            SchedulerConfig {
                probe_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );

        let started = std::time::Instant::now();
        scheduler.run_once(&CancellationToken::new()).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        let slow = store.get("provider:slow").unwrap();
        assert_eq!(slow.consecutive_failures, 1);
        assert_eq!(slow.last_detail.as_deref(), Some("timeout"));
        assert!(store.get("broker").unwrap().lifecycle.is_healthy());
    }

    #[tokio::test]
    async fn test_cancelled_results_are_discarded() {
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(FnProbe::new("store", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }))];
        let (scheduler, store) = scheduler(probes, SchedulerConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let summary = scheduler.run_once(&cancel).await;
        assert_eq!(summary.cancelled, 1);
        assert!(store.get("store").is_none_or(|s| s.consecutive_failures == 0));
    }

    #[tokio::test]
    async fn test_run_ticks_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(FnProbe::new("web", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }))];
        let (scheduler, _store) = scheduler(
            probes,
            SchedulerConfig {
                tick_interval: Duration::from_millis(50),
                probe_timeout: Duration::from_millis(20),
                status_file: None,
            },
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run(token).await });
        tokio::time::sleep(Duration::from_millis(180)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_status_file_written_for_interrupted_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(FnProbe::new("store", || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }))];
        let (scheduler, _store) = scheduler(
            probes,
            SchedulerConfig {
                tick_interval: Duration::from_secs(60),
                probe_timeout: Duration::from_secs(1),
                status_file: Some(path.clone()),
            },
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run(token).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        // The file is on disk as soon as `run` returns.
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["overall"], "healthy");
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let (scheduler, _store) = scheduler(
            Vec::new(),
            SchedulerConfig {
                tick_interval: Duration::ZERO,
                ..Default::default()
            },
        );
        assert!(scheduler.run(CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_write_status_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("status.json");
        let store = ComponentStore::new();
        store.register("store", true);

        write_status_file(&path, &store.snapshot(Utc::now())).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["overall"], "healthy");
        assert_eq!(json["components"][0]["name"], "store");
    }
}
