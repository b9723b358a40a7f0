//! Window hider
//!
//! Hides every visible top-level window of the processes behind an
//! identifier and remembers enough to put them back: the handle, the owning
//! pid and whether the window had focus. Failures on individual windows are
//! logged and skipped; nothing here is fatal to the caller.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::FreezerResult;
use crate::process_table::ProcessTable;

/// Opaque OS window reference. May go stale once the window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub isize);

/// OS window primitives the hider needs
pub trait WindowSystem: Send + Sync {
    /// Currently visible top-level windows owned by `pid`
    fn visible_windows(&self, pid: u32) -> FreezerResult<Vec<WindowHandle>>;

    /// Window holding input focus, if any
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Remove from the visible set without destroying or moving it
    fn hide(&self, window: WindowHandle) -> FreezerResult<()>;

    /// Show at its remembered size and position without activating it
    fn show(&self, window: WindowHandle) -> FreezerResult<()>;

    fn set_foreground(&self, window: WindowHandle) -> FreezerResult<()>;
}

/// Pre-hide state of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HiddenWindowSnapshot {
    pub window_handle: WindowHandle,
    pub owning_process_numeric_id: u32,
    pub was_foreground: bool,
}

#[derive(Default)]
struct HiderState {
    /// Snapshots per pid, in hide order
    snapshots: HashMap<u32, Vec<HiddenWindowSnapshot>>,
    /// Pids whose windows were hidden under each identifier, so a restore
    /// still finds them if the identifier no longer resolves the same way
    owners: HashMap<String, BTreeSet<u32>>,
}

impl HiderState {
    fn is_hidden(&self, pid: u32, window: WindowHandle) -> bool {
        self.snapshots
            .get(&pid)
            .is_some_and(|list| list.iter().any(|s| s.window_handle == window))
    }

    fn forget_empty_owners(&mut self) {
        let snapshots = &self.snapshots;
        self.owners.retain(|_, pids| {
            pids.retain(|pid| snapshots.contains_key(pid));
            !pids.is_empty()
        });
    }
}

/// Hides and restores the windows of frozen processes
pub struct WindowHider {
    windows: Arc<dyn WindowSystem>,
    processes: Arc<dyn ProcessTable>,
    state: Mutex<HiderState>,
}

impl WindowHider {
    pub fn new(windows: Arc<dyn WindowSystem>, processes: Arc<dyn ProcessTable>) -> Self {
        Self {
            windows,
            processes,
            state: Mutex::new(HiderState::default()),
        }
    }

    /// Hide all visible top-level windows of every process behind `identifier`.
    ///
    /// Returns how many windows were newly hidden. Zero matching processes is
    /// a no-op; windows that are already hidden keep their first snapshot.
    pub fn hide_by_identifier(&self, identifier: &str) -> usize {
        let pids = self.processes.pids_for(identifier);
        if pids.is_empty() {
            debug!("No running process for {:?}; nothing to hide", identifier);
            return 0;
        }

        let mut state = self.state.lock();
        // Read focus once up front; hiding the first window moves it.
        let foreground = self.windows.foreground_window();
        let mut hidden = 0;

        for pid in pids {
            let windows = match self.windows.visible_windows(pid) {
                Ok(windows) => windows,
                Err(e) => {
                    warn!("Could not enumerate windows of pid {}: {}", pid, e);
                    continue;
                }
            };

            for window in windows {
                if state.is_hidden(pid, window) {
                    continue;
                }
                if let Err(e) = self.windows.hide(window) {
                    warn!("Could not hide window {:?} of pid {}: {}", window, pid, e);
                    continue;
                }
                state.snapshots.entry(pid).or_default().push(HiddenWindowSnapshot {
                    window_handle: window,
                    owning_process_numeric_id: pid,
                    was_foreground: foreground == Some(window),
                });
                state.owners.entry(identifier.to_string()).or_default().insert(pid);
                hidden += 1;
            }
        }

        if hidden > 0 {
            info!("Hid {} window(s) for {:?}", hidden, identifier);
        }
        hidden
    }

    /// Show every window previously hidden for `identifier`, then hand focus
    /// back to the window that had it.
    ///
    /// Snapshots are discarded whether or not their windows still exist, so a
    /// second call, or a call without a prior hide, does nothing.
    pub fn restore_by_identifier(&self, identifier: &str) -> usize {
        let mut state = self.state.lock();

        let mut pids: BTreeSet<u32> = self.processes.pids_for(identifier).into_iter().collect();
        if let Some(owned) = state.owners.remove(identifier) {
            pids.extend(owned);
        }

        let mut restored = 0;
        for pid in pids {
            let Some(snapshots) = state.snapshots.remove(&pid) else {
                continue;
            };

            for snapshot in &snapshots {
                match self.windows.show(snapshot.window_handle) {
                    Ok(()) => restored += 1,
                    Err(e) => debug!(
                        "Could not show window {:?} of pid {} (likely closed): {}",
                        snapshot.window_handle, pid, e
                    ),
                }
            }

            if let Some(focused) = snapshots.iter().find(|s| s.was_foreground) {
                if let Err(e) = self.windows.set_foreground(focused.window_handle) {
                    warn!(
                        "Could not return focus to window {:?} of pid {}: {}",
                        focused.window_handle, pid, e
                    );
                }
            }
        }

        state.forget_empty_owners();

        if restored > 0 {
            info!("Restored {} window(s) for {:?}", restored, identifier);
        }
        restored
    }

    /// Whether any windows are currently hidden under `identifier`
    pub fn has_hidden(&self, identifier: &str) -> bool {
        let state = self.state.lock();
        if state.owners.contains_key(identifier) {
            return true;
        }
        drop(state);

        let pids = self.processes.pids_for(identifier);
        let state = self.state.lock();
        pids.iter().any(|pid| state.snapshots.contains_key(pid))
    }

    /// Snapshots held for one pid, in hide order
    #[cfg(test)]
    pub fn snapshots_for(&self, pid: u32) -> Vec<HiddenWindowSnapshot> {
        self.state
            .lock()
            .snapshots
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of hidden windows across all processes
    pub fn hidden_count(&self) -> usize {
        self.state.lock().snapshots.values().map(Vec::len).sum()
    }

    /// Show every hidden window, frozen or not. Snapshots only live in memory,
    /// so anything still hidden at exit would stay hidden for good.
    pub fn restore_all(&self) -> usize {
        let pending = self.hidden_count();
        if pending == 0 {
            return 0;
        }
        warn!("Showing {} hidden window(s) before exit", pending);

        let identifiers: Vec<String> = self.state.lock().owners.keys().cloned().collect();
        let mut restored = 0;
        for identifier in identifiers {
            restored += self.restore_by_identifier(&identifier);
        }
        restored
    }
}
