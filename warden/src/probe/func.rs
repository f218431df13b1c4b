//! Closure-backed probe.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::Probe;
use crate::Result;

type CheckFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Probe whose check is an async closure.
#[derive(Clone)]
pub struct FnProbe {
    name: String,
    restart_eligible: bool,
    timeout: Option<Duration>,
    check: CheckFn,
}

impl FnProbe {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            restart_eligible: true,
            timeout: None,
            check: Arc::new(move || Box::pin(check())),
        }
    }

    /// Mark this probe advisory-only: it alerts but never restarts.
    pub fn advisory(mut self) -> Self {
        self.restart_eligible = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for FnProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProbe")
            .field("name", &self.name)
            .field("restart_eligible", &self.restart_eligible)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Probe for FnProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn restart_eligible(&self) -> bool {
        self.restart_eligible
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn check(&self) -> Result<()> {
        (self.check)().await
    }
}
