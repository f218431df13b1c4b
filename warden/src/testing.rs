//! Test doubles for the restart and notification seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::notification::{NotificationChannel, OutboundMessage};
use crate::restart::Restarter;
use crate::{Error, Result};

pub use crate::probe::FnProbe;

/// Restarter that records every call.
#[derive(Debug, Default)]
pub struct RecordingRestarter {
    calls: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingRestarter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A restarter whose calls all fail.
    pub fn failing() -> Self {
        let restarter = Self::default();
        restarter.set_failing(true);
        restarter
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, component: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == component).count()
    }
}

#[async_trait]
impl Restarter for RecordingRestarter {
    async fn restart(&self, component: &str) -> Result<()> {
        self.calls.lock().push(component.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::restart(component, "restart mechanism unreachable"));
        }
        Ok(())
    }
}

/// Channel that records every delivered message.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    messages: Mutex<Vec<OutboundMessage>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose sends all fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn messages_for(&self, component: &str) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.component.as_deref() == Some(component))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::notify("recording", "channel unavailable"));
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}
