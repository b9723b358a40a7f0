//! Configuration management for Process Freezer
//!
//! Handles the data directory layout and the `settings.toml` file holding
//! user preferences consumed by the freeze core and the hotkey manager.

use anyhow::Result;
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::hotkey::RetryPolicy;
use crate::utils::write_atomic;

const APP_DIR_NAME: &str = "process-freezer";
const REGISTRY_FILE: &str = "processes.json";
const SETTINGS_FILE: &str = "settings.toml";
const LOG_FILE: &str = "process-freezer.log";

/// Settings shared with the dispatcher and the orchestrator; replaced on reload
pub type SharedConfig = Arc<RwLock<Config>>;

/// Locations of every file the application reads or writes
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    /// Use an explicit data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Default per-user data directory
    pub fn default_location() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR_NAME))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Hide a process's top-level windows before suspending it
    pub hide_window_on_freeze: bool,
    /// Global chord that toggles the process list window
    pub toggle_hotkey: String,
    /// External suspend/resume tool
    pub suspend: SuspendConfig,
    /// Hotkey health checking and retry
    pub hotkey: HotkeyConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hide_window_on_freeze: false,
            toggle_hotkey: "ctrl+alt+f".to_string(),
            suspend: SuspendConfig::default(),
            hotkey: HotkeyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Load configuration from file or create default.
    ///
    /// A file that fails to parse is left untouched and defaults are used.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from: {:?}", path);
            let content = std::fs::read_to_string(path)?;
            return match Self::parse(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!("Failed to parse config, using defaults: {}", e);
                    Ok(Self::default())
                }
            };
        }

        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Load and validate, failing instead of falling back to defaults
    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.suspend.executable.trim().is_empty() {
            anyhow::bail!("suspend.executable must not be empty");
        }
        if self.suspend.timeout_ms == 0 {
            anyhow::bail!("suspend.timeout_ms must be greater than zero");
        }
        if self.hotkey.health_check_interval_ms == 0 {
            anyhow::bail!("hotkey.health_check_interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())?;
        info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}

/// External suspend tool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SuspendConfig {
    /// Executable invoked with the process identifier
    pub executable: String,
    /// Flag that switches the tool from suspend to resume
    pub resume_flag: String,
    /// Arguments passed before the direction flag on every invocation
    pub extra_args: Vec<String>,
    /// How long to wait for the tool before treating the action as failed
    pub timeout_ms: u64,
}

impl Default for SuspendConfig {
    fn default() -> Self {
        Self {
            executable: "pssuspend64.exe".to_string(),
            resume_flag: "-r".to_string(),
            extra_args: Vec::new(),
            timeout_ms: 10_000,
        }
    }
}

impl SuspendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Hotkey health-check configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Interval between registration health checks
    pub health_check_interval_ms: u64,
    /// Delay before the first retry; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Upper bound for the retry delay
    pub retry_max_delay_ms: u64,
    /// Attempts before giving up until the chord is changed
    pub max_attempts: u32,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 5_000,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl HotkeyConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: "trace", "debug", "info", "warn" or "error"
    pub level: String,
    /// Also append log lines to the log file in the data directory
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn toml_roundtrip_default() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&s).expect("parse");
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("hide_window_on_freeze = true\n").unwrap();
        assert!(parsed.hide_window_on_freeze);
        assert_eq!(parsed.toggle_hotkey, "ctrl+alt+f");
        assert_eq!(parsed.suspend.executable, "pssuspend64.exe");
        assert_eq!(parsed.suspend.resume_flag, "-r");
    }

    #[test]
    fn load_or_default_creates_missing_file() {
        let tmp = tempdir().unwrap();
        let paths = Paths::new(tmp.path());
        let cfg = Config::load_or_default(&paths.settings_path()).expect("load");
        assert_eq!(cfg, Config::default());
        assert!(paths.settings_path().exists());
    }

    #[test]
    fn save_and_load_or_default_reads_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("settings.toml");
        let mut cfg = Config::default();
        cfg.toggle_hotkey = "ctrl+shift+p".to_string();
        cfg.hide_window_on_freeze = true;
        cfg.save(&path).expect("save");

        let loaded = Config::load_or_default(&path).expect("load");
        assert_eq!(loaded.toggle_hotkey, "ctrl+shift+p");
        assert!(loaded.hide_window_on_freeze);
    }

    #[test]
    fn corrupt_file_falls_back_without_overwriting() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("settings.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let loaded = Config::load_or_default(&path).expect("load");
        assert_eq!(loaded, Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "this is = = not toml");
        assert!(Config::try_load(&path).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("settings.toml");
        fs::write(&path, "[suspend]\ntimeout_ms = 0\n").unwrap();
        assert!(Config::try_load(&path).is_err());
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = HotkeyConfig::default().retry_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn paths_layout() {
        let paths = Paths::new("/tmp/pf");
        assert!(paths.registry_path().ends_with("processes.json"));
        assert!(paths.settings_path().ends_with("settings.toml"));
        assert!(paths.log_path().ends_with("process-freezer.log"));
        assert!(Paths::default_location()
            .data_dir()
            .ends_with("process-freezer"));
    }
}
