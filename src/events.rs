//! Event dispatch
//!
//! UI input (tray clicks, list double-clicks, the hotkey, settings reloads)
//! arrives as [`AppEvent`]s on one channel. A single dispatcher thread owns
//! the channel; each freeze/resume runs on its own short-lived thread so the
//! UI never waits on the external tool. Results flow back to the front end
//! through an [`Observer`].

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::{Config, SharedConfig};
use crate::error::{FreezerError, FreezerResult};
use crate::hotkey::{HotkeyManager, RegistrationState};
use crate::logging;
use crate::orchestrator::{FreezeOrchestrator, FreezeState};
use crate::suspend::ExternalTool;

/// Requests coming from the front end
#[derive(Debug, Clone)]
pub enum AppEvent {
    Toggle(String),
    Freeze(String),
    Resume(String),
    Add {
        identifier: String,
        display_name: String,
    },
    Remove(String),
    SetHideOnFreeze(bool),
    /// A validated settings file was written
    SettingsChanged(Box<Config>),
    /// The toggle chord was pressed
    ToggleVisibility,
    Quit,
}

/// Updates pushed back to the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Registry or settings changed; redraw
    Refresh,
    /// An action did not complete; show `message` to the user
    ActionFailed {
        identifier: Option<String>,
        message: String,
    },
    ToggleVisibility,
    /// The global hotkey is not available
    HotkeyUnavailable(String),
}

/// Receives notifications; called from dispatcher and action threads
pub trait Observer: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Fans each notification out to every registered observer
#[derive(Default, Clone)]
pub struct Observers {
    observers: Vec<Arc<dyn Observer>>,
}

impl Observers {
    pub fn push(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    fn len(&self) -> usize {
        self.observers.len()
    }
}

impl Observer for Observers {
    fn notify(&self, notification: Notification) {
        for observer in &self.observers {
            observer.notify(notification.clone());
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Owns the event loop
pub struct Dispatcher {
    orchestrator: Arc<FreezeOrchestrator>,
    settings: SharedConfig,
    settings_path: Option<PathBuf>,
    observer: Arc<Observers>,
    hotkeys: Option<Arc<Mutex<HotkeyManager>>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<FreezeOrchestrator>) -> Self {
        let settings = orchestrator.settings().clone();
        Self {
            orchestrator,
            settings,
            settings_path: None,
            observer: Arc::new(Observers::default()),
            hotkeys: None,
            workers: Vec::new(),
        }
    }

    /// Add a receiver for results; all observers see every notification
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        Arc::make_mut(&mut self.observer).push(observer);
        self
    }

    /// Persist toggled settings to this file
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    /// Rebind this manager when the chord changes
    pub fn with_hotkeys(mut self, hotkeys: Arc<Mutex<HotkeyManager>>) -> Self {
        self.hotkeys = Some(hotkeys);
        self
    }

    /// Start the dispatcher thread
    pub fn spawn(self) -> FreezerResult<(Sender<AppEvent>, JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || self.run(rx))?;
        Ok((tx, handle))
    }

    fn run(mut self, rx: Receiver<AppEvent>) {
        info!("Dispatcher started with {} observer(s)", self.observer.len());
        for event in rx.iter() {
            debug!("Dispatching {:?}", event);
            if let Flow::Stop = self.handle(event) {
                break;
            }
            self.workers.retain(|h| !h.is_finished());
        }

        // Let in-flight actions finish so their results are persisted.
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("Dispatcher stopped");
    }

    fn handle(&mut self, event: AppEvent) -> Flow {
        match event {
            AppEvent::Toggle(id) => self.spawn_action(id, |o, id| o.toggle(id)),
            AppEvent::Freeze(id) => self.spawn_action(id, |o, id| o.freeze(id)),
            AppEvent::Resume(id) => self.spawn_action(id, |o, id| o.resume(id)),
            AppEvent::Add {
                identifier,
                display_name,
            } => {
                let result = self.orchestrator.add(&identifier, &display_name);
                self.report(Some(identifier), result);
            }
            AppEvent::Remove(id) => {
                let result = self.orchestrator.remove(&id).map(|_| ());
                self.report(Some(id), result);
            }
            AppEvent::SetHideOnFreeze(enabled) => self.set_hide_on_freeze(enabled),
            AppEvent::SettingsChanged(config) => self.apply_settings(*config),
            AppEvent::ToggleVisibility => self.observer.notify(Notification::ToggleVisibility),
            AppEvent::Quit => return Flow::Stop,
        }
        Flow::Continue
    }

    fn spawn_action<F>(&mut self, identifier: String, action: F)
    where
        F: FnOnce(&FreezeOrchestrator, &str) -> FreezerResult<FreezeState> + Send + 'static,
    {
        // The action would be rejected anyway; skip the thread.
        if self.orchestrator.is_busy(&identifier) {
            info!("Ignoring request for {:?}: an action is already running", identifier);
            return;
        }

        let orchestrator = self.orchestrator.clone();
        let observer = self.observer.clone();
        let spawned = thread::Builder::new()
            .name(format!("action-{}", identifier))
            .spawn(move || {
                let result = action(&orchestrator, &identifier).map(|state| {
                    debug!("{:?} is now {}", identifier, state.label());
                });
                report_to(observer.as_ref(), Some(identifier), result);
            });

        match spawned {
            Ok(handle) => self.workers.push(handle),
            Err(e) => {
                error!("Could not start action thread: {}", e);
                self.observer.notify(Notification::ActionFailed {
                    identifier: None,
                    message: e.to_string(),
                });
            }
        }
    }

    fn report(&self, identifier: Option<String>, result: FreezerResult<()>) {
        report_to(self.observer.as_ref(), identifier, result);
    }

    fn set_hide_on_freeze(&mut self, enabled: bool) {
        info!("Hide windows on freeze: {}", enabled);
        let snapshot = {
            let mut settings = self.settings.write();
            settings.hide_window_on_freeze = enabled;
            settings.clone()
        };
        if let Some(path) = &self.settings_path {
            if let Err(e) = snapshot.save(path) {
                warn!("Could not save settings: {}", e);
                self.observer.notify(Notification::ActionFailed {
                    identifier: None,
                    message: format!("Could not save settings: {}", e),
                });
            }
        }
        self.observer.notify(Notification::Refresh);
    }

    fn apply_settings(&mut self, config: Config) {
        let previous = std::mem::replace(&mut *self.settings.write(), config.clone());
        if previous == config {
            debug!("Settings reload changed nothing");
            return;
        }
        info!("Applying reloaded settings");

        if previous.logging.level != config.logging.level {
            log::set_max_level(logging::parse_level(&config.logging.level));
        }
        if previous.suspend != config.suspend {
            self.orchestrator
                .set_action(Arc::new(ExternalTool::from_config(&config.suspend)));
        }
        if previous.hotkey.health_check_interval_ms != config.hotkey.health_check_interval_ms {
            info!("New hotkey health check interval applies after restart");
        }

        if let Some(hotkeys) = &self.hotkeys {
            let mut manager = hotkeys.lock();
            manager.set_policy(config.hotkey.retry_policy());
            if previous.toggle_hotkey != config.toggle_hotkey {
                match manager.rebind(&config.toggle_hotkey) {
                    Ok(RegistrationState::Registered) => {}
                    Ok(state) => warn!(
                        "Hotkey {:?} is {:?}; retrying in the background",
                        config.toggle_hotkey, state
                    ),
                    Err(e) => self
                        .observer
                        .notify(Notification::HotkeyUnavailable(e.to_string())),
                }
            }
        }

        self.observer.notify(Notification::Refresh);
    }
}

fn report_to(observer: &dyn Observer, identifier: Option<String>, result: FreezerResult<()>) {
    match result {
        Ok(()) => {}
        Err(FreezerError::Busy(id)) => {
            info!("Ignoring request for {:?}: an action is already running", id);
            return;
        }
        Err(e) => {
            warn!("Action failed: {}", e);
            observer.notify(Notification::ActionFailed {
                identifier,
                message: e.user_message(),
            });
        }
    }
    observer.notify(Notification::Refresh);
}
