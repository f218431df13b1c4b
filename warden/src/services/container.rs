//! Service container wiring every supervisor task together.
//!
//! Task topology:
//! - probe scheduler → policy engine (probe results)
//! - policy engine → restart worker (restart requests) → policy engine (outcomes)
//! - policy engine, digest scheduler → notifier → dispatch worker → channels
//!
//! Shutdown cancels the shared token, lets the restart worker finish any
//! call it is in the middle of, then drains the engine and the notification
//! queue, all bounded by the shutdown timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::WardenConfig;
use crate::digest::DigestReport;
use crate::domain::StatusSnapshot;
use crate::notification::{
    DispatchWorker, MessageKind, NotificationChannel, Notifier, NotifierStats, Severity,
};
use crate::policy::{EngineHandle, FailurePolicy, PolicyEngine};
use crate::probe::{Probe, ProbeRegistry};
use crate::restart::{CommandRestarter, RestartWorker, Restarter};
use crate::scheduler::{DigestScheduler, ProbeScheduler, TickSummary};
use crate::state::ComponentStore;
use crate::{Error, Result};

const RESTART_QUEUE_CAPACITY: usize = 32;

/// Builder for [`Warden`].
///
/// Anything not supplied explicitly is derived from the configuration:
/// probes from `[[probes]]`, channels from `[notification]`, the restarter
/// from `[restart]`.
pub struct WardenBuilder {
    config: WardenConfig,
    probes: Vec<Arc<dyn Probe>>,
    channels: Option<Vec<Arc<dyn NotificationChannel>>>,
    restarter: Option<Arc<dyn Restarter>>,
    clock: Option<Arc<dyn Clock>>,
}

impl WardenBuilder {
    /// Register an additional probe.
    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Replace the configured notification channels.
    pub fn channels(mut self, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn restarter(mut self, restarter: Arc<dyn Restarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Warden> {
        let config = self.config;
        config.validate()?;

        let store = ComponentStore::new();
        let mut registry = ProbeRegistry::new(store.clone());
        registry.register_all(&config.probes)?;
        for probe in self.probes {
            registry.register(probe)?;
        }

        let channels = match self.channels {
            Some(channels) => channels,
            None => config
                .notification
                .channels
                .iter()
                .map(|c| c.build())
                .collect::<Result<Vec<_>>>()?,
        };
        let restarter: Arc<dyn Restarter> = match self.restarter {
            Some(restarter) => restarter,
            None => Arc::new(CommandRestarter::new(config.restart.clone())?),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let (notifier, dispatch) = Notifier::new(config.notifier_config()?, channels);
        let (restart_tx, restart_rx) = mpsc::channel(RESTART_QUEUE_CAPACITY);
        let (engine, engine_handle) = PolicyEngine::new(
            store.clone(),
            FailurePolicy::new(config.policy_config()?),
            notifier.clone(),
            restart_tx,
            clock.clone(),
        );
        let restart_worker = RestartWorker::new(restarter, restart_rx, engine_handle.clone());
        let scheduler = Arc::new(ProbeScheduler::new(
            config.scheduler_config(),
            registry.probes().to_vec(),
            engine_handle.clone(),
            store.clone(),
            clock.clone(),
        ));
        let digest = DigestScheduler::new(
            config.digest_config()?,
            store.clone(),
            notifier.clone(),
            clock.clone(),
        );

        info!(
            components = ?registry.names(),
            threshold = config.supervisor.failure_threshold,
            "Warden initialized"
        );

        Ok(Warden {
            shutdown_timeout: config.shutdown_timeout(),
            config,
            store,
            notifier,
            engine: engine_handle,
            scheduler,
            clock,
            cancel: CancellationToken::new(),
            fatal: Arc::new(Mutex::new(None)),
            idle: Some(IdleParts {
                engine,
                restart_worker,
                dispatch,
                digest,
            }),
            workers: None,
            loops: None,
            digest_pending: None,
        })
    }
}

struct IdleParts {
    engine: PolicyEngine,
    restart_worker: RestartWorker,
    dispatch: DispatchWorker,
    digest: DigestScheduler,
}

struct WorkerTasks {
    engine: JoinHandle<()>,
    restart_worker: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

struct LoopTasks {
    scheduler: JoinHandle<()>,
    digest: JoinHandle<()>,
}

/// The supervisor: owns the component store and every background task.
pub struct Warden {
    config: WardenConfig,
    store: ComponentStore,
    notifier: Notifier,
    engine: EngineHandle,
    scheduler: Arc<ProbeScheduler>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
    fatal: Arc<Mutex<Option<String>>>,
    idle: Option<IdleParts>,
    workers: Option<WorkerTasks>,
    loops: Option<LoopTasks>,
    digest_pending: Option<DigestScheduler>,
}

impl Warden {
    pub fn builder(config: WardenConfig) -> WardenBuilder {
        WardenBuilder {
            config,
            probes: Vec::new(),
            channels: None,
            restarter: None,
            clock: None,
        }
    }

    /// Build a warden entirely from configuration.
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Spawn the engine, restart worker and notification dispatcher, without
    /// starting the tick loop or the digest timer.
    pub fn start_workers(&mut self) {
        if self.workers.is_some() {
            return;
        }
        let Some(idle) = self.idle.take() else {
            return;
        };

        let cancel = self.cancel.clone();
        self.workers = Some(WorkerTasks {
            engine: tokio::spawn(idle.engine.run()),
            restart_worker: tokio::spawn(idle.restart_worker.run(cancel)),
            dispatch: tokio::spawn(idle.dispatch.run()),
        });
        self.digest_pending = Some(idle.digest);
    }

    /// Start every task and announce the supervisor to the operator.
    pub fn start(&mut self) {
        self.start_workers();
        if self.loops.is_some() {
            return;
        }
        let Some(digest) = self.digest_pending.take() else {
            return;
        };

        let scheduler = self.scheduler.clone();
        let scheduler_task = self.spawn_fatal_on_error("probe scheduler", move |cancel| async move {
            scheduler.run(cancel).await
        });
        let digest_task = self.spawn_fatal_on_error("digest scheduler", move |cancel| {
            digest.run(cancel)
        });

        self.loops = Some(LoopTasks {
            scheduler: scheduler_task,
            digest: digest_task,
        });

        let components = self.store.states();
        let body = format!(
            "Supervising {} components: {}\nTick interval: {}s, failure threshold: {}, restart cooldown: {}s.",
            components.len(),
            components
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.config.supervisor.tick_interval_secs,
            self.config.supervisor.failure_threshold,
            self.config.supervisor.restart_cooldown_secs,
        );
        self.notifier
            .send_unthrottled(MessageKind::System, Severity::Info, "supervisor started", &body);
        info!(components = components.len(), "Warden started");
    }

    fn spawn_fatal_on_error<F, Fut>(&self, task: &'static str, f: F) -> JoinHandle<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let fatal = self.fatal.clone();
        let fut = f(cancel.clone());
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                error!(task, error = %e, "Fatal supervisor error");
                *fatal.lock() = Some(format!("{}: {}", task, e));
                cancel.cancel();
            }
        })
    }

    /// Run one tick and wait for its results to be applied.
    pub async fn run_once(&mut self) -> TickSummary {
        self.start_workers();
        self.scheduler.run_once(&self.cancel).await
    }

    /// Current snapshot of every component.
    pub fn status(&self) -> StatusSnapshot {
        self.store.snapshot(self.clock.now())
    }

    /// Digest built from the current snapshot, without sending it.
    pub fn digest_report(&self) -> DigestReport {
        DigestReport::from_snapshot(self.status())
    }

    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifier_stats(&self) -> NotifierStats {
        self.notifier.stats()
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Token cancelled on shutdown or after a fatal error.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until the engine has applied everything submitted so far.
    pub async fn flush(&self) {
        self.engine.flush().await;
        self.notifier.flush().await;
    }

    /// Stop every task and wait for them, bounded by the shutdown timeout.
    ///
    /// Returns an error if the supervisor stopped because of a fatal error.
    pub async fn shutdown(self) -> Result<()> {
        let Warden {
            notifier,
            engine,
            scheduler,
            cancel,
            shutdown_timeout,
            fatal,
            idle,
            workers,
            loops,
            digest_pending,
            ..
        } = self;

        info!(timeout_secs = shutdown_timeout.as_secs(), "Shutting down warden");
        cancel.cancel();
        let announce = loops.is_some();
        drop(idle);
        drop(digest_pending);

        let drained = tokio::time::timeout(shutdown_timeout, async move {
            if let Some(loops) = loops {
                join("probe scheduler", loops.scheduler).await;
                join("digest scheduler", loops.digest).await;
            }
            drop(scheduler);

            if let Some(workers) = workers {
                join("restart worker", workers.restart_worker).await;
                drop(engine);
                join("policy engine", workers.engine).await;

                if announce {
                    notifier.send_unthrottled(
                        MessageKind::System,
                        Severity::Info,
                        "supervisor stopped",
                        "The supervisor is shutting down. No further checks will run until it is restarted.",
                    );
                }
                drop(notifier);
                join("notification dispatch", workers.dispatch).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        info!("Warden shut down");
        match fatal.lock().take() {
            Some(reason) => Err(Error::Other(format!("supervisor stopped: {}", reason))),
            None => Ok(()),
        }
    }
}

async fn join(task: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(task, error = %e, "Task ended abnormally");
    }
}
