//! In-memory stand-ins for the OS seams, shared by the unit tests

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{FreezerError, FreezerResult};
use crate::events::{Notification, Observer};
use crate::hider::{WindowHandle, WindowSystem};
use crate::hotkey::{Chord, HotkeyBackend, HotkeyCallback};
use crate::process_table::ProcessTable;
use crate::suspend::{Direction, SuspendAction};

// ---------------------------------------------------------------------------
// Windows

#[derive(Debug, Clone, Copy)]
struct FakeWindow {
    pid: u32,
    visible: bool,
}

#[derive(Default)]
struct WindowsState {
    windows: BTreeMap<WindowHandle, FakeWindow>,
    foreground: Option<WindowHandle>,
    fail_hide: HashSet<WindowHandle>,
    fail_enumerate: HashSet<u32>,
    show_calls: usize,
}

/// Desktop with a handful of top-level windows
#[derive(Default)]
pub struct FakeWindows {
    state: Mutex<WindowsState>,
}

impl FakeWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&self, pid: u32, handle: WindowHandle, visible: bool) {
        self.state
            .lock()
            .windows
            .insert(handle, FakeWindow { pid, visible });
    }

    pub fn set_foreground_window(&self, handle: Option<WindowHandle>) {
        self.state.lock().foreground = handle;
    }

    /// Visible windows, sorted by handle
    pub fn visible_set(&self) -> Vec<WindowHandle> {
        self.state
            .lock()
            .windows
            .iter()
            .filter(|(_, w)| w.visible)
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn foreground(&self) -> Option<WindowHandle> {
        self.state.lock().foreground
    }

    pub fn show_calls(&self) -> usize {
        self.state.lock().show_calls
    }

    /// Make a window visible behind the hider's back
    pub fn force_visible(&self, handle: WindowHandle) {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.visible = true;
        }
    }

    pub fn fail_hide(&self, handle: WindowHandle) {
        self.state.lock().fail_hide.insert(handle);
    }

    pub fn fail_enumerate(&self, pid: u32) {
        self.state.lock().fail_enumerate.insert(pid);
    }

    pub fn close_window(&self, handle: WindowHandle) {
        let mut state = self.state.lock();
        state.windows.remove(&handle);
        if state.foreground == Some(handle) {
            state.foreground = None;
        }
    }
}

impl WindowSystem for FakeWindows {
    fn visible_windows(&self, pid: u32) -> FreezerResult<Vec<WindowHandle>> {
        let state = self.state.lock();
        if state.fail_enumerate.contains(&pid) {
            return Err(FreezerError::WindowOperationFailed(format!(
                "cannot enumerate pid {}",
                pid
            )));
        }
        Ok(state
            .windows
            .iter()
            .filter(|(_, w)| w.pid == pid && w.visible)
            .map(|(h, _)| *h)
            .collect())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.state.lock().foreground
    }

    fn hide(&self, window: WindowHandle) -> FreezerResult<()> {
        let mut state = self.state.lock();
        if state.fail_hide.contains(&window) {
            return Err(FreezerError::WindowOperationFailed(format!(
                "cannot hide {:?}",
                window
            )));
        }
        let w = state
            .windows
            .get_mut(&window)
            .ok_or_else(|| FreezerError::WindowOperationFailed("no such window".into()))?;
        w.visible = false;
        if state.foreground == Some(window) {
            state.foreground = None;
        }
        Ok(())
    }

    fn show(&self, window: WindowHandle) -> FreezerResult<()> {
        let mut state = self.state.lock();
        state.show_calls += 1;
        let w = state
            .windows
            .get_mut(&window)
            .ok_or_else(|| FreezerError::WindowOperationFailed("no such window".into()))?;
        w.visible = true;
        Ok(())
    }

    fn set_foreground(&self, window: WindowHandle) -> FreezerResult<()> {
        let mut state = self.state.lock();
        if !state.windows.contains_key(&window) {
            return Err(FreezerError::WindowOperationFailed("no such window".into()));
        }
        state.foreground = Some(window);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processes

/// Identifier to pid table set up by the test
#[derive(Default)]
pub struct FakeProcesses {
    table: Mutex<HashMap<String, Vec<u32>>>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identifier: &str, pids: &[u32]) {
        self.table.lock().insert(identifier.to_string(), pids.to_vec());
    }
}

impl ProcessTable for FakeProcesses {
    fn pids_for(&self, identifier: &str) -> Vec<u32> {
        let mut pids = self.table.lock().get(identifier).cloned().unwrap_or_default();
        pids.sort_unstable();
        pids.dedup();
        pids
    }
}

// ---------------------------------------------------------------------------
// Suspend tool

type RunHook = Box<dyn Fn(&str, Direction) + Send + Sync>;

#[derive(Default)]
struct SuspendState {
    failures: VecDeque<String>,
    calls: Vec<(String, Direction)>,
    held: bool,
}

/// Scripted suspend tool. Succeeds unless a failure is queued; can be held
/// mid-run to exercise concurrency.
#[derive(Default)]
pub struct FakeSuspend {
    state: Mutex<SuspendState>,
    changed: Condvar,
    hook: Mutex<Option<RunHook>>,
}

impl FakeSuspend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next run fails with `diagnostic`
    pub fn fail_next(&self, diagnostic: &str) {
        self.state.lock().failures.push_back(diagnostic.to_string());
    }

    pub fn calls(&self) -> Vec<(String, Direction)> {
        self.state.lock().calls.clone()
    }

    /// Called inside every run before it completes
    pub fn on_run(&self, hook: impl Fn(&str, Direction) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Block runs until `release`
    pub fn hold(&self) {
        self.state.lock().held = true;
    }

    pub fn release(&self) {
        self.state.lock().held = false;
        self.changed.notify_all();
    }

    /// Wait until at least `count` runs have started
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.calls.len() < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.calls.len() >= count;
            }
        }
        true
    }
}

impl SuspendAction for FakeSuspend {
    fn run(&self, identifier: &str, direction: Direction) -> FreezerResult<()> {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(identifier, direction);
        }

        let mut state = self.state.lock();
        state.calls.push((identifier.to_string(), direction));
        self.changed.notify_all();
        while state.held {
            self.changed.wait(&mut state);
        }

        match state.failures.pop_front() {
            Some(diagnostic) => Err(FreezerError::ExternalActionFailed {
                identifier: identifier.to_string(),
                diagnostic,
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Hotkeys

#[derive(Default)]
struct HotkeyState {
    active: Vec<(Chord, HotkeyCallback)>,
    install_attempts: usize,
    fail_next: usize,
}

/// Records installs; clones share state so tests can inspect after handing
/// one to the manager
#[derive(Clone, Default)]
pub struct FakeHotkeyBackend {
    state: Arc<Mutex<HotkeyState>>,
}

impl FakeHotkeyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` installs
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    pub fn install_attempts(&self) -> usize {
        self.state.lock().install_attempts
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn active_chord(&self) -> Option<Chord> {
        self.state.lock().active.last().map(|(c, _)| c.clone())
    }

    /// Simulate the OS silently dropping the hook
    pub fn drop_registration(&self) {
        self.state.lock().active.clear();
    }

    /// Press and release the chord
    pub fn fire(&self) {
        let callbacks: Vec<HotkeyCallback> =
            self.state.lock().active.iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback();
        }
    }
}

impl HotkeyBackend for FakeHotkeyBackend {
    fn install(&mut self, chord: &Chord, callback: HotkeyCallback) -> FreezerResult<()> {
        let mut state = self.state.lock();
        state.install_attempts += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(FreezerError::HotkeyRegistrationFailed(
                "hotkey already taken".into(),
            ));
        }
        state.active.push((chord.clone(), callback));
        Ok(())
    }

    fn uninstall(&mut self) {
        self.state.lock().active.clear();
    }

    fn is_installed(&self) -> bool {
        !self.state.lock().active.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Observer

/// Collects notifications for later inspection
#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Notification>>,
    changed: Condvar,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    /// Wait for a notification matching `pred`
    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&Notification) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut seen = self.seen.lock();
        loop {
            if seen.iter().any(&pred) {
                return true;
            }
            if self.changed.wait_until(&mut seen, deadline).timed_out() {
                return seen.iter().any(&pred);
            }
        }
    }
}

impl Observer for RecordingObserver {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
        self.changed.notify_all();
    }
}
