//! In-memory component state table.
//!
//! Each component's state sits behind its own mutex so that updates for one
//! component never contend with another. Readers take a copy-on-read
//! snapshot and hold each lock only long enough to clone the entry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::domain::{ComponentState, StatusSnapshot};

type Entry = Arc<Mutex<ComponentState>>;

/// Table of component states keyed by component name.
#[derive(Debug, Clone, Default)]
pub struct ComponentStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, creating its state if it does not exist yet.
    ///
    /// Re-registering keeps the existing counters and only refreshes the
    /// restart eligibility flag.
    pub fn register(&self, name: &str, restart_eligible: bool) {
        let mut entries = self.entries.write();
        match entries.get(name) {
            Some(entry) => entry.lock().restart_eligible = restart_eligible,
            None => {
                debug!(component = %name, restart_eligible, "Registered component");
                entries.insert(
                    name.to_string(),
                    Arc::new(Mutex::new(ComponentState::new(name, restart_eligible))),
                );
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of one component's state.
    pub fn get(&self, name: &str) -> Option<ComponentState> {
        let entry = self.entries.read().get(name).cloned()?;
        let state = entry.lock().clone();
        Some(state)
    }

    /// Apply `f` to a component's state under its lock.
    ///
    /// Components that were never registered are created on first use as
    /// restart-eligible.
    pub(crate) fn with_component<R>(&self, name: &str, f: impl FnOnce(&mut ComponentState) -> R) -> R {
        let entry = self.entry(name);
        let mut state = entry.lock();
        f(&mut state)
    }

    fn entry(&self, name: &str) -> Entry {
        if let Some(entry) = self.entries.read().get(name) {
            return entry.clone();
        }
        self.entries
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ComponentState::new(name, true))))
            .clone()
    }

    /// Copies of every component state, sorted by name.
    pub fn states(&self) -> Vec<ComponentState> {
        let entries: Vec<Entry> = self.entries.read().values().cloned().collect();
        let mut states: Vec<ComponentState> =
            entries.iter().map(|entry| entry.lock().clone()).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    pub fn snapshot(&self, generated_at: DateTime<Utc>) -> StatusSnapshot {
        StatusSnapshot::new(self.states(), generated_at)
    }
}
