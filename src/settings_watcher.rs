//! Watches `settings.toml` and forwards validated reloads to the dispatcher.
//!
//! The data directory is watched rather than the file itself because saves
//! replace the file by renaming a temp file over it. Events for other files
//! are ignored, unchanged content is ignored, and a file that fails to parse
//! is logged and skipped so the running settings stay in effect.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::Config;
use crate::error::{FreezerError, FreezerResult};
use crate::events::AppEvent;

pub struct SettingsWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl SettingsWatcher {
    /// Start watching `path`; reloads are sent as `AppEvent::SettingsChanged`
    pub fn spawn(path: PathBuf, events: Sender<AppEvent>) -> FreezerResult<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)
            .map_err(|e| FreezerError::Config(format!("cannot create settings watcher: {}", e)))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| FreezerError::Config(format!("cannot watch {:?}: {}", dir, e)))?;

        let last = std::fs::read_to_string(&path).ok();
        let handle = thread::Builder::new()
            .name("settings-watcher".into())
            .spawn(move || watch_loop(&path, last, rx, events))?;

        info!("Watching {:?} for settings changes", dir);
        Ok(Self {
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        // Dropping the watcher closes the channel and ends the loop.
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn is_relevant(event: &Event, path: &Path) -> bool {
    let file_name = path.file_name();
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    ) && event.paths.iter().any(|p| p.file_name() == file_name)
}

fn watch_loop(
    path: &Path,
    mut last: Option<String>,
    rx: Receiver<notify::Result<Event>>,
    events: Sender<AppEvent>,
) {
    for result in rx {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!("Settings watcher error: {}", e);
                continue;
            }
        };
        if !is_relevant(&event, path) {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        if last.as_deref() == Some(content.as_str()) {
            continue;
        }
        last = Some(content);

        match Config::try_load(path) {
            Ok(config) => {
                info!("settings.toml changed, reloading");
                if events.send(AppEvent::SettingsChanged(Box::new(config))).is_err() {
                    break;
                }
            }
            Err(e) => warn!("settings.toml invalid, keeping current settings: {}", e),
        }
    }
    debug!("Settings watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::write_atomic;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn next_reload(rx: &Receiver<AppEvent>, within: Duration) -> Option<Config> {
        let deadline = Instant::now() + within;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(AppEvent::SettingsChanged(config)) => return Some(*config),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }

    #[test]
    fn valid_change_is_forwarded_and_invalid_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        Config::default().save(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = SettingsWatcher::spawn(path.clone(), tx).unwrap();

        write_atomic(&path, b"toggle_hotkey = \"ctrl+shift+p\"\n").unwrap();
        let reloaded = next_reload(&rx, Duration::from_secs(5)).expect("reload");
        assert_eq!(reloaded.toggle_hotkey, "ctrl+shift+p");

        write_atomic(&path, b"[suspend]\ntimeout_ms = 0\n").unwrap();
        assert!(next_reload(&rx, Duration::from_millis(500)).is_none());
    }

    #[test]
    fn other_files_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        Config::default().save(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = SettingsWatcher::spawn(path, tx).unwrap();
        std::fs::write(dir.path().join("processes.json"), "{}").unwrap();
        assert!(next_reload(&rx, Duration::from_millis(500)).is_none());
    }
}
