//! Background restart worker.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{RestartOutcome, Restarter};
use crate::policy::EngineHandle;

/// Request to restart one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub component: String,
}

/// Runs restart requests one at a time and reports each outcome to the
/// policy engine.
pub struct RestartWorker {
    restarter: Arc<dyn Restarter>,
    rx: mpsc::Receiver<RestartRequest>,
    engine: EngineHandle,
}

impl RestartWorker {
    pub fn new(
        restarter: Arc<dyn Restarter>,
        rx: mpsc::Receiver<RestartRequest>,
        engine: EngineHandle,
    ) -> Self {
        Self {
            restarter,
            rx,
            engine,
        }
    }

    /// Process requests until cancelled or the engine goes away.
    ///
    /// A restart that is already running when `cancel` fires is allowed to
    /// finish. Requests still queued at that point are reported as failed so
    /// the engine never waits on them.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Restart worker started");

        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.handle(request).await;
        }

        self.rx.close();
        while let Ok(request) = self.rx.try_recv() {
            warn!(component = %request.component, "Dropping queued restart on shutdown");
            self.engine
                .restart_outcome(
                    &request.component,
                    RestartOutcome::Failed("supervisor shutting down".to_string()),
                )
                .await;
        }

        info!("Restart worker stopped");
    }

    async fn handle(&self, request: RestartRequest) {
        info!(component = %request.component, "Restarting component");
        let outcome = RestartOutcome::from(self.restarter.restart(&request.component).await);
        match &outcome {
            RestartOutcome::Succeeded => {
                info!(component = %request.component, "Restart dispatched")
            }
            RestartOutcome::Failed(detail) => {
                warn!(component = %request.component, error = %detail, "Restart failed")
            }
        }
        self.engine
            .restart_outcome(&request.component, outcome)
            .await;
    }
}
