//! Application wiring for the tray front end

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use log::{info, warn};
use parking_lot::Mutex;
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::PostMessageW;

use crate::config::{Config, Paths};
use crate::events::{AppEvent, Dispatcher, Notification, Observer};
use crate::hider::WindowHider;
use crate::hotkey::{HealthMonitor, HealthStatus, HotkeyManager, RegistrationState};
use crate::orchestrator::FreezeOrchestrator;
use crate::platform::win32::desktop::Win32WindowSystem;
use crate::platform::win32::keyboard_hook::KeyboardHookBackend;
use crate::platform::win32::list_window::{
    clear_ui_state, set_ui_state, ListWindow, UiState, WindowNotifier, WM_APP_REFRESH,
};
use crate::platform::win32::tray::TrayIcon;
use crate::process_table::SysinfoProcessTable;
use crate::registry::ProcessStore;
use crate::settings_watcher::SettingsWatcher;
use crate::suspend::ExternalTool;

/// Main application state
pub struct Application {
    window: ListWindow,
    hider: Arc<WindowHider>,
    events: Sender<AppEvent>,
    dispatcher: Option<JoinHandle<()>>,
    hotkeys: Arc<Mutex<HotkeyManager>>,
    monitor: Option<HealthMonitor>,
    watcher: Option<SettingsWatcher>,
}

impl Application {
    pub fn new(paths: Paths, config: Config) -> Result<Self> {
        info!("Initializing Process Freezer");

        let health_interval = config.hotkey.health_check_interval();
        let policy = config.hotkey.retry_policy();
        let combination = config.toggle_hotkey.clone();
        let settings = config.into_shared();

        let store = ProcessStore::load(paths.registry_path()).into_shared();
        let processes = Arc::new(SysinfoProcessTable::new());
        let hider = Arc::new(WindowHider::new(
            Arc::new(Win32WindowSystem::new()),
            processes.clone(),
        ));
        let action = Arc::new(ExternalTool::from_config(&settings.read().suspend));
        let orchestrator = Arc::new(FreezeOrchestrator::new(
            store.clone(),
            hider.clone(),
            action,
            settings.clone(),
            processes.clone(),
        ));

        let window = ListWindow::create()?;
        let errors = Arc::new(Mutex::new(VecDeque::new()));
        let notifier = Arc::new(WindowNotifier::new(window.hwnd(), errors.clone()));

        let hotkeys = Arc::new(Mutex::new(HotkeyManager::new(
            Box::new(KeyboardHookBackend::new()),
            policy,
        )));

        let (events, dispatcher) = Dispatcher::new(orchestrator)
            .with_observer(notifier.clone())
            .with_settings_path(paths.settings_path())
            .with_hotkeys(hotkeys.clone())
            .spawn()?;

        let hotkey_events = Mutex::new(events.clone());
        let registered = hotkeys.lock().register(
            &combination,
            Arc::new(move || {
                let _ = hotkey_events.lock().send(AppEvent::ToggleVisibility);
            }),
        );
        match registered {
            Ok(RegistrationState::Failing) => {
                let manager = hotkeys.lock();
                let reason = manager
                    .binding()
                    .and_then(|b| b.last_error())
                    .unwrap_or("unknown error");
                warn!("Hotkey {:?} failed ({}); retrying in the background", combination, reason);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Hotkey {:?} not registered: {}", combination, e);
                notifier.notify(Notification::HotkeyUnavailable(e.user_message()));
            }
        }

        let monitor_notifier = notifier.clone();
        let monitor =
            HealthMonitor::spawn(Arc::downgrade(&hotkeys), health_interval, move |status| {
                match status {
                    HealthStatus::GaveUp(reason) => {
                        monitor_notifier.notify(Notification::HotkeyUnavailable(reason))
                    }
                    HealthStatus::Recovered => info!("Global hotkey restored"),
                    _ => {}
                }
            });

        let watcher = match SettingsWatcher::spawn(paths.settings_path(), events.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Settings changes will need a restart: {}", e);
                None
            }
        };

        // Tray is optional; the hotkey still opens the list without it.
        let tray = match TrayIcon::new(window.hwnd(), "Process Freezer") {
            Ok(tray) => Some(tray),
            Err(e) => {
                warn!("Failed to create tray icon: {}", e);
                None
            }
        };

        set_ui_state(UiState::new(
            store,
            settings,
            events.clone(),
            errors,
            processes,
            tray,
            window.controls(),
        ));
        unsafe {
            let _ = PostMessageW(window.hwnd(), WM_APP_REFRESH, WPARAM(0), LPARAM(0));
        }

        Ok(Self {
            window,
            hider,
            events,
            dispatcher: Some(dispatcher),
            hotkeys,
            monitor: Some(monitor),
            watcher,
        })
    }

    /// Run until the window is destroyed, then shut down
    pub fn run(&mut self) -> Result<()> {
        info!("Starting main loop");
        let result = self.window.run_message_loop();
        info!("Main loop ended");
        self.shutdown();
        result
    }

    fn shutdown(&mut self) {
        let _ = self.events.send(AppEvent::Quit);
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.hotkeys.lock().unregister();
        self.watcher.take();
        // Snapshots are not persisted; anything left hidden would be lost.
        self.hider.restore_all();
        clear_ui_state();
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        self.shutdown();
    }
}
