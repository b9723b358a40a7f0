//! Freeze orchestrator
//!
//! Sequences one freeze or resume: optional window hiding, the external
//! suspend action, and the registry update. The registry only changes once
//! the action has succeeded.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::config::SharedConfig;
use crate::error::{FreezerError, FreezerResult};
use crate::hider::WindowHider;
use crate::process_table::ProcessTable;
use crate::registry::SharedStore;
use crate::suspend::{Direction, SuspendAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeState {
    Frozen,
    Running,
}

impl FreezeState {
    pub fn from_frozen(frozen: bool) -> Self {
        if frozen {
            Self::Frozen
        } else {
            Self::Running
        }
    }

    pub fn is_frozen(self) -> bool {
        self == Self::Frozen
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Frozen => "Frozen",
            Self::Running => "Running",
        }
    }
}

/// Snapshot of one registered process for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub identifier: String,
    pub display_name: String,
    pub state: FreezeState,
    /// At least one process currently runs under the identifier
    pub running: bool,
    pub windows_hidden: bool,
}

/// Drives freeze/resume for registered processes
pub struct FreezeOrchestrator {
    store: SharedStore,
    hider: Arc<WindowHider>,
    action: RwLock<Arc<dyn SuspendAction>>,
    settings: SharedConfig,
    processes: Arc<dyn ProcessTable>,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks an identifier busy until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    identifier: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, identifier: &str) -> FreezerResult<Self> {
        if !set.lock().insert(identifier.to_string()) {
            return Err(FreezerError::Busy(identifier.to_string()));
        }
        Ok(Self {
            set,
            identifier: identifier.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.identifier);
    }
}

impl FreezeOrchestrator {
    pub fn new(
        store: SharedStore,
        hider: Arc<WindowHider>,
        action: Arc<dyn SuspendAction>,
        settings: SharedConfig,
        processes: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            store,
            hider,
            action: RwLock::new(action),
            settings,
            processes,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn settings(&self) -> &SharedConfig {
        &self.settings
    }

    /// Swap the suspend tool, e.g. after the settings changed
    pub fn set_action(&self, action: Arc<dyn SuspendAction>) {
        *self.action.write() = action;
    }

    fn desired_state(&self, identifier: &str) -> FreezerResult<FreezeState> {
        self.store
            .lock()
            .get(identifier)
            .map(|r| FreezeState::from_frozen(r.desired_frozen))
            .ok_or_else(|| FreezerError::UnknownProcess(identifier.to_string()))
    }

    /// Flip a registered process between frozen and running.
    ///
    /// The current state is read under the in-flight guard, so the target is
    /// always the negation of what the previous request left behind. Returns
    /// the new state. On failure the recorded state is unchanged.
    pub fn toggle(&self, identifier: &str) -> FreezerResult<FreezeState> {
        let _guard = InFlight::acquire(&self.in_flight, identifier)?;

        let target = match self.desired_state(identifier)? {
            FreezeState::Frozen => FreezeState::Running,
            FreezeState::Running => FreezeState::Frozen,
        };
        self.apply(identifier, target)
    }

    pub fn freeze(&self, identifier: &str) -> FreezerResult<FreezeState> {
        self.transition(identifier, FreezeState::Frozen)
    }

    pub fn resume(&self, identifier: &str) -> FreezerResult<FreezeState> {
        self.transition(identifier, FreezeState::Running)
    }

    /// Move `identifier` to `target`. Already in `target` is a no-op; a
    /// second request while one is running is rejected with `Busy`.
    pub fn transition(&self, identifier: &str, target: FreezeState) -> FreezerResult<FreezeState> {
        let _guard = InFlight::acquire(&self.in_flight, identifier)?;

        let current = self.desired_state(identifier)?;
        if current == target {
            debug!("{:?} is already {}", identifier, target.label());
            return Ok(current);
        }
        self.apply(identifier, target)
    }

    // Caller holds the in-flight guard for `identifier`.
    fn apply(&self, identifier: &str, target: FreezeState) -> FreezerResult<FreezeState> {
        match target {
            FreezeState::Frozen => self.do_freeze(identifier),
            FreezeState::Running => self.do_resume(identifier),
        }
    }

    fn suspend_action(&self) -> Arc<dyn SuspendAction> {
        self.action.read().clone()
    }

    fn do_freeze(&self, identifier: &str) -> FreezerResult<FreezeState> {
        let hide = self.settings.read().hide_window_on_freeze;
        if hide {
            // Hide before suspending; a suspended process cannot react to it.
            self.hider.hide_by_identifier(identifier);
        }

        if let Err(e) = self.suspend_action().run(identifier, Direction::Suspend) {
            if self.hider.has_hidden(identifier) {
                self.hider.restore_by_identifier(identifier);
            }
            return Err(e);
        }

        self.store.lock().set_frozen(identifier, true)?;
        info!("{:?} frozen", identifier);
        Ok(FreezeState::Frozen)
    }

    fn do_resume(&self, identifier: &str) -> FreezerResult<FreezeState> {
        self.suspend_action().run(identifier, Direction::Resume)?;

        let persisted = self.store.lock().set_frozen(identifier, false);
        // Windows come back only once the process can paint again.
        if self.hider.has_hidden(identifier) {
            self.hider.restore_by_identifier(identifier);
        }
        persisted?;
        info!("{:?} resumed", identifier);
        Ok(FreezeState::Running)
    }

    /// Register a process without touching it
    pub fn add(&self, identifier: &str, display_name: &str) -> FreezerResult<()> {
        self.store.lock().add(identifier, display_name)
    }

    /// Forget a process. It is not resumed; its hidden windows are shown.
    pub fn remove(&self, identifier: &str) -> FreezerResult<bool> {
        let _guard = InFlight::acquire(&self.in_flight, identifier)?;
        let removed = self.store.lock().remove(identifier)?;
        if removed && self.hider.has_hidden(identifier) {
            warn!("Showing windows of removed process {:?}", identifier);
            self.hider.restore_by_identifier(identifier);
        }
        Ok(removed)
    }

    /// Current view of every registered process, in registry order
    pub fn status(&self) -> Vec<ProcessStatus> {
        let records = self.store.lock().records().to_vec();
        records
            .into_iter()
            .map(|record| ProcessStatus {
                running: self.processes.is_running(&record.identifier),
                windows_hidden: self.hider.has_hidden(&record.identifier),
                state: FreezeState::from_frozen(record.desired_frozen),
                identifier: record.identifier,
                display_name: record.display_name,
            })
            .collect()
    }

    pub fn is_busy(&self, identifier: &str) -> bool {
        self.in_flight.lock().contains(identifier)
    }
}
