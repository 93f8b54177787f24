//! Watch-channel backed state store
//!
//! Every mutation is a single `send_if_modified` call, so a subscriber
//! always observes a complete snapshot and is only woken on real changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Registration state of the remapping agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not yet queried
    #[default]
    Unknown,
    Disabled,
    Enabled,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Unknown => write!(f, "unknown"),
            ServiceState::Disabled => write!(f, "disabled"),
            ServiceState::Enabled => write!(f, "enabled"),
        }
    }
}

/// Snapshot handed to observers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStatus {
    pub state: ServiceState,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl MappingStatus {
    pub fn is_mapping_enabled(&self) -> bool {
        self.state == ServiceState::Enabled
    }
}

/// Shared handle to the observable state
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<MappingStatus>>,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(MappingStatus::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> MappingStatus {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes after a change. Changes made before the
    /// receiver looks are merged into the newest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<MappingStatus> {
        self.tx.subscribe()
    }

    /// A transaction started: raise `loading` and clear the previous error
    pub fn begin(&self) {
        self.modify(|status| {
            status.loading = true;
            status.last_error = None;
        });
    }

    /// Record a status query outside of any transaction
    pub fn refresh(&self, state: ServiceState, error: Option<String>) {
        self.modify(|status| {
            status.state = state;
            status.last_error = error;
        });
    }

    /// A transaction finished: apply the re-queried state, drop `loading`
    /// and record the outcome together
    pub fn finish(&self, state: ServiceState, error: Option<String>) {
        self.modify(|status| {
            status.state = state;
            status.loading = false;
            status.last_error = error;
        });
    }

    /// A transaction stopped before touching privileged state
    pub fn abort(&self, error: String) {
        self.modify(|status| {
            status.loading = false;
            status.last_error = Some(error);
        });
    }

    /// Drop `loading` if a transaction ended without reporting back
    pub fn clear_loading(&self) {
        self.modify(|status| status.loading = false);
    }

    fn modify(&self, f: impl FnOnce(&mut MappingStatus)) {
        self.tx.send_if_modified(|status| {
            let before = status.clone();
            f(status);
            let changed = *status != before;
            if changed {
                debug!(?status, "mapping status changed");
            }
            changed
        });
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
