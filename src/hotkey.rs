//! Hotkey system for Process Freezer
//!
//! One global chord toggles the process list. The manager owns the single
//! active binding, checks on an interval that the OS registration is still
//! alive, and re-installs it with exponential backoff when it is not.

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{FreezerError, FreezerResult};

/// Invoked on chord release. Must return quickly; it runs on the hook thread.
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

/// Modifier keys held in a chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.alt || self.shift || self.win)
    }
}

/// Parsed key combination, e.g. `ctrl+alt+f`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chord {
    pub modifiers: Modifiers,
    /// Windows virtual key code of the non-modifier key
    pub key: u32,
}

const VK_F1: u32 = 0x70;
const VK_F24: u32 = 0x87;

impl Chord {
    /// Parse a chord string like "ctrl+alt+f" or "Ctrl+Shift+F9".
    ///
    /// Exactly one non-modifier key is required. A chord without modifiers
    /// is only accepted for function keys, since the chord is swallowed
    /// system-wide.
    pub fn parse(s: &str) -> FreezerResult<Self> {
        let invalid = |reason: &str| FreezerError::InvalidHotkey(format!("{:?}: {}", s, reason));

        let mut modifiers = Modifiers::default();
        let mut key = None;

        for part in s.split('+').map(str::trim) {
            if part.is_empty() {
                return Err(invalid("empty key name"));
            }
            match part.to_ascii_uppercase().as_str() {
                "CTRL" | "CONTROL" => modifiers.ctrl = true,
                "ALT" => modifiers.alt = true,
                "SHIFT" => modifiers.shift = true,
                "WIN" | "WINDOWS" | "SUPER" => modifiers.win = true,
                other => {
                    if key.is_some() {
                        return Err(invalid("more than one non-modifier key"));
                    }
                    key = Some(Self::parse_key(other).ok_or_else(|| invalid("unknown key"))?);
                }
            }
        }

        let key = key.ok_or_else(|| invalid("missing a non-modifier key"))?;
        if modifiers.is_empty() && !(VK_F1..=VK_F24).contains(&key) {
            return Err(invalid("needs at least one modifier"));
        }

        Ok(Self { modifiers, key })
    }

    /// Parse a key name to virtual key code
    fn parse_key(s: &str) -> Option<u32> {
        // Single character keys
        if s.len() == 1 {
            let c = s.chars().next()?;
            if c.is_ascii_alphanumeric() {
                return Some(c.to_ascii_uppercase() as u32);
            }
        }

        if let Some(n) = s.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
            if (1..=24).contains(&n) {
                return Some(VK_F1 + n - 1);
            }
        }

        // Special keys
        match s {
            "SPACE" => Some(0x20),
            "ENTER" | "RETURN" => Some(0x0D),
            "TAB" => Some(0x09),
            "ESCAPE" | "ESC" => Some(0x1B),
            "BACKSPACE" => Some(0x08),
            "DELETE" | "DEL" => Some(0x2E),
            "INSERT" | "INS" => Some(0x2D),
            "HOME" => Some(0x24),
            "END" => Some(0x23),
            "PAGEUP" | "PGUP" => Some(0x21),
            "PAGEDOWN" | "PGDN" => Some(0x22),
            "UP" => Some(0x26),
            "DOWN" => Some(0x28),
            "LEFT" => Some(0x25),
            "RIGHT" => Some(0x27),
            "PAUSE" => Some(0x13),
            _ => None,
        }
    }

    fn key_name(key: u32) -> String {
        match key {
            0x30..=0x39 | 0x41..=0x5A => char::from_u32(key).map(String::from).unwrap_or_default(),
            VK_F1..=VK_F24 => format!("F{}", key - VK_F1 + 1),
            0x20 => "Space".into(),
            0x0D => "Enter".into(),
            0x09 => "Tab".into(),
            0x1B => "Esc".into(),
            0x08 => "Backspace".into(),
            0x2E => "Delete".into(),
            0x2D => "Insert".into(),
            0x24 => "Home".into(),
            0x23 => "End".into(),
            0x21 => "PageUp".into(),
            0x22 => "PageDown".into(),
            0x26 => "Up".into(),
            0x28 => "Down".into(),
            0x25 => "Left".into(),
            0x27 => "Right".into(),
            0x13 => "Pause".into(),
            other => format!("0x{:02X}", other),
        }
    }
}

impl FromStr for Chord {
    type Err = FreezerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.modifiers;
        for (held, name) in [(m.ctrl, "Ctrl"), (m.alt, "Alt"), (m.shift, "Shift"), (m.win, "Win")] {
            if held {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", Self::key_name(self.key))
    }
}

/// OS side of a global chord. Only one chord is ever installed at a time.
pub trait HotkeyBackend: Send {
    fn install(&mut self, chord: &Chord, callback: HotkeyCallback) -> FreezerResult<()>;
    fn uninstall(&mut self);
    /// Whether the OS registration is still in place
    fn is_installed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
    Failing,
}

/// Exponential backoff for re-registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base doubled per attempt, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// The single active chord and its registration bookkeeping
#[derive(Debug, Clone)]
pub struct HotkeyBinding {
    pub key_combination: String,
    pub chord: Chord,
    pub registration_state: RegistrationState,
    pub retry_count: u32,
    next_attempt: Option<Instant>,
    last_error: Option<String>,
}

impl HotkeyBinding {
    fn new(key_combination: &str, chord: Chord) -> Self {
        Self {
            key_combination: key_combination.to_string(),
            chord,
            registration_state: RegistrationState::Unregistered,
            retry_count: 0,
            next_attempt: None,
            last_error: None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Outcome of one health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Nothing to check: no binding, or retries were exhausted
    Idle,
    Healthy,
    /// Registration is down; next attempt is scheduled
    Waiting { attempt: u32, retry_in: Duration },
    /// A retry just succeeded
    Recovered,
    /// Retries exhausted; stays down until the chord is changed
    GaveUp(String),
}

/// Owns the global hotkey registration
pub struct HotkeyManager {
    backend: Box<dyn HotkeyBackend>,
    policy: RetryPolicy,
    binding: Option<HotkeyBinding>,
    callback: Option<HotkeyCallback>,
}

impl HotkeyManager {
    pub fn new(backend: Box<dyn HotkeyBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            binding: None,
            callback: None,
        }
    }

    pub fn binding(&self) -> Option<&HotkeyBinding> {
        self.binding.as_ref()
    }

    pub fn state(&self) -> RegistrationState {
        self.binding
            .as_ref()
            .map_or(RegistrationState::Unregistered, |b| b.registration_state)
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Replace the active binding with `combination` firing `callback`.
    ///
    /// The previous binding is torn down first. An unparsable chord leaves
    /// nothing registered; an OS refusal leaves the binding `Failing` and
    /// the health check retries it.
    pub fn register(
        &mut self,
        combination: &str,
        callback: HotkeyCallback,
    ) -> FreezerResult<RegistrationState> {
        self.teardown();

        let chord = Chord::parse(combination)?;
        self.callback = Some(callback);

        let mut binding = HotkeyBinding::new(combination, chord);
        self.try_install(&mut binding, Instant::now());
        let state = binding.registration_state;
        self.binding = Some(binding);
        Ok(state)
    }

    /// Switch to a new chord, keeping the current callback
    pub fn rebind(&mut self, combination: &str) -> FreezerResult<RegistrationState> {
        let callback = self.callback.clone().ok_or_else(|| {
            FreezerError::HotkeyRegistrationFailed("no hotkey callback has been registered".into())
        })?;
        info!("Changing hotkey to {:?}", combination);
        self.register(combination, callback)
    }

    /// Remove the binding completely
    pub fn unregister(&mut self) {
        self.teardown();
        self.callback = None;
    }

    fn teardown(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!("Tearing down hotkey {}", binding.chord);
        }
        self.backend.uninstall();
    }

    fn try_install(&mut self, binding: &mut HotkeyBinding, now: Instant) -> bool {
        let Some(callback) = self.callback.clone() else {
            return false;
        };

        match self.backend.install(&binding.chord, callback) {
            Ok(()) => {
                info!("Registered hotkey {}", binding.chord);
                binding.registration_state = RegistrationState::Registered;
                binding.retry_count = 0;
                binding.next_attempt = None;
                binding.last_error = None;
                true
            }
            Err(e) => {
                warn!("Failed to register hotkey {}: {}", binding.chord, e);
                if binding.registration_state != RegistrationState::Failing {
                    binding.retry_count = 0;
                }
                binding.registration_state = RegistrationState::Failing;
                binding.next_attempt = Some(now + self.policy.delay_for(binding.retry_count));
                binding.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Verify the registration and drive retries. Call on a fixed interval.
    pub fn health_check(&mut self, now: Instant) -> HealthStatus {
        let Some(mut binding) = self.binding.take() else {
            return HealthStatus::Idle;
        };
        let status = self.check_binding(&mut binding, now);
        self.binding = Some(binding);
        status
    }

    fn check_binding(&mut self, binding: &mut HotkeyBinding, now: Instant) -> HealthStatus {
        match binding.registration_state {
            RegistrationState::Unregistered => HealthStatus::Idle,
            RegistrationState::Registered => {
                if self.backend.is_installed() {
                    return HealthStatus::Healthy;
                }
                warn!("Hotkey {} registration disappeared; scheduling retry", binding.chord);
                self.backend.uninstall();
                binding.registration_state = RegistrationState::Failing;
                binding.retry_count = 0;
                binding.last_error = Some("registration disappeared".to_string());
                let retry_in = self.policy.delay_for(0);
                binding.next_attempt = Some(now + retry_in);
                HealthStatus::Waiting {
                    attempt: 1,
                    retry_in,
                }
            }
            RegistrationState::Failing => {
                if let Some(due) = binding.next_attempt {
                    if now < due {
                        return HealthStatus::Waiting {
                            attempt: binding.retry_count + 1,
                            retry_in: due - now,
                        };
                    }
                }

                if binding.retry_count >= self.policy.max_attempts {
                    return self.give_up(binding);
                }

                debug!(
                    "Retrying hotkey {} (attempt {})",
                    binding.chord,
                    binding.retry_count + 1
                );
                self.backend.uninstall();
                if self.try_install(binding, now) {
                    info!("Hotkey {} recovered", binding.chord);
                    return HealthStatus::Recovered;
                }

                binding.retry_count += 1;
                if binding.retry_count >= self.policy.max_attempts {
                    return self.give_up(binding);
                }
                let retry_in = self.policy.delay_for(binding.retry_count);
                binding.next_attempt = Some(now + retry_in);
                HealthStatus::Waiting {
                    attempt: binding.retry_count + 1,
                    retry_in,
                }
            }
        }
    }

    fn give_up(&mut self, binding: &mut HotkeyBinding) -> HealthStatus {
        self.backend.uninstall();
        binding.registration_state = RegistrationState::Unregistered;
        binding.next_attempt = None;
        let message = format!(
            "Hotkey {} could not be registered after {} attempt(s): {}",
            binding.chord,
            binding.retry_count,
            binding.last_error.as_deref().unwrap_or("unknown error")
        );
        warn!("{}", message);
        HealthStatus::GaveUp(message)
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        self.backend.uninstall();
    }
}

/// Background thread running `HotkeyManager::health_check` on a fixed interval.
///
/// Holds only a weak reference; the thread exits once the manager is dropped
/// or the monitor is stopped.
pub struct HealthMonitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// `on_change` receives `Recovered` and `GaveUp` results
    pub fn spawn<F>(manager: Weak<Mutex<HotkeyManager>>, interval: Duration, on_change: F) -> Self
    where
        F: Fn(HealthStatus) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("hotkey-health".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                let Some(manager) = manager.upgrade() else {
                    debug!("Hotkey manager gone; stopping health checks");
                    break;
                };
                let status = manager.lock().health_check(Instant::now());
                drop(manager);
                match status {
                    HealthStatus::Recovered | HealthStatus::GaveUp(_) => on_change(status),
                    HealthStatus::Waiting { attempt, retry_in } => {
                        debug!("Hotkey retry {} due in {:?}", attempt, retry_in)
                    }
                    HealthStatus::Idle | HealthStatus::Healthy => {}
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not start hotkey health checks: {}", e);
                None
            }
        };

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHotkeyBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, HotkeyCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let callback: HotkeyCallback = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            max_attempts: 3,
        }
    }

    #[test]
    fn parse_chords() {
        let chord = Chord::parse("ctrl+alt+f").unwrap();
        assert!(chord.modifiers.ctrl && chord.modifiers.alt);
        assert!(!chord.modifiers.shift && !chord.modifiers.win);
        assert_eq!(chord.key, 'F' as u32);

        let chord: Chord = " Shift + Win + F9 ".parse().unwrap();
        assert!(chord.modifiers.shift && chord.modifiers.win);
        assert_eq!(chord.key, 0x78);

        assert_eq!(Chord::parse("F12").unwrap().key, 0x7B);
        assert_eq!(Chord::parse("ctrl+space").unwrap().key, 0x20);
    }

    #[test]
    fn reject_bad_chords() {
        for bad in ["", "ctrl+", "ctrl+alt", "f", "ctrl+a+b", "ctrl+bogus", "alt++x", "F25"] {
            assert!(
                matches!(Chord::parse(bad), Err(FreezerError::InvalidHotkey(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn display_normalizes() {
        assert_eq!(Chord::parse("alt+CTRL+f").unwrap().to_string(), "Ctrl+Alt+F");
        assert_eq!(Chord::parse("shift+f10").unwrap().to_string(), "Shift+F10");
        assert_eq!(Chord::parse("win+pgdn").unwrap().to_string(), "Win+PageDown");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
        assert_eq!(p.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(p.delay_for(40), Duration::from_millis(1_000));
    }

    #[test]
    fn register_success() {
        let backend = FakeHotkeyBackend::new();
        let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
        let (count, callback) = counter();

        assert_eq!(
            manager.register("ctrl+alt+f", callback).unwrap(),
            RegistrationState::Registered
        );
        assert_eq!(manager.binding().unwrap().retry_count, 0);
        assert_eq!(manager.health_check(Instant::now()), HealthStatus::Healthy);

        backend.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_chord_registers_nothing() {
        let backend = FakeHotkeyBackend::new();
        let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
        let (_, callback) = counter();
        manager.register("ctrl+alt+f", callback.clone()).unwrap();

        assert!(manager.register("nonsense", callback).is_err());
        assert_eq!(manager.state(), RegistrationState::Unregistered);
        assert_eq!(backend.active_count(), 0);
        assert_eq!(manager.health_check(Instant::now()), HealthStatus::Idle);
    }

    #[test]
    fn rebind_leaves_exactly_one_binding() {
        let backend = FakeHotkeyBackend::new();
        let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
        let (count, callback) = counter();

        manager.register("ctrl+alt+f", callback).unwrap();
        manager.rebind("ctrl+shift+g").unwrap();
        manager.rebind("ctrl+shift+h").unwrap();

        assert_eq!(backend.active_count(), 1);
        assert_eq!(backend.active_chord().unwrap().to_string(), "Ctrl+Shift+H");
        backend.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rebind_without_callback_fails() {
        let mut manager = HotkeyManager::new(Box::new(FakeHotkeyBackend::new()), policy());
        assert!(matches!(
            manager.rebind("ctrl+alt+f"),
            Err(FreezerError::HotkeyRegistrationFailed(_))
        ));
    }

    #[test]
    fn failing_registration_retries_with_backoff() {
        let backend = FakeHotkeyBackend::new();
        backend.fail_next(2);
        let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
        let (_, callback) = counter();
        let t0 = Instant::now();

        assert_eq!(manager.register("ctrl+alt+f", callback).unwrap(), RegistrationState::Failing);
        assert_eq!(manager.binding().unwrap().retry_count, 0);

        // Not due yet.
        assert!(matches!(
            manager.health_check(t0),
            HealthStatus::Waiting { attempt: 1, .. }
        ));
        assert_eq!(backend.install_attempts(), 1);

        // First retry at +100ms fails, next one is scheduled 200ms later.
        assert_eq!(
            manager.health_check(t0 + Duration::from_millis(150)),
            HealthStatus::Waiting {
                attempt: 2,
                retry_in: Duration::from_millis(200)
            }
        );
        assert_eq!(manager.binding().unwrap().retry_count, 1);

        // Second retry succeeds.
        assert_eq!(
            manager.health_check(t0 + Duration::from_millis(400)),
            HealthStatus::Recovered
        );
        assert_eq!(manager.state(), RegistrationState::Registered);
        assert_eq!(manager.binding().unwrap().retry_count, 0);
        assert_eq!(backend.active_count(), 1);
    }

    #[test]
    fn gives_up_after_max_attempts_until_changed() {
        let backend = FakeHotkeyBackend::new();
        backend.fail_next(100);
        let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
        let (_, callback) = counter();
        let mut now = Instant::now();

        manager.register("ctrl+alt+f", callback).unwrap();
        let mut gave_up = None;
        for _ in 0..20 {
            now += Duration::from_secs(5);
            if let HealthStatus::GaveUp(msg) = manager.health_check(now) {
                gave_up = Some(msg);
                break;
            }
        }
        assert!(gave_up.unwrap().contains("Ctrl+Alt+F"));
        assert_eq!(manager.state(), RegistrationState::Unregistered);
        // 1 initial install + 3 retries
        assert_eq!(backend.install_attempts(), 4);

        // No more retries.
        assert_eq!(manager.health_check(now + Duration::from_secs(60)), HealthStatus::Idle);
        assert_eq!(backend.install_attempts(), 4);

        // Changing the chord starts over.
        backend.fail_next(0);
        assert_eq!(manager.rebind("ctrl+alt+g").unwrap(), RegistrationState::Registered);
        assert_eq!(manager.binding().unwrap().retry_count, 0);
    }

    #[test]
    fn silently_lost_registration_is_reinstalled() {
        let backend = FakeHotkeyBackend::new();
        let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
        let (count, callback) = counter();
        let t0 = Instant::now();
        manager.register("ctrl+alt+f", callback).unwrap();

        backend.drop_registration();
        assert!(matches!(
            manager.health_check(t0),
            HealthStatus::Waiting { attempt: 1, .. }
        ));
        assert_eq!(manager.state(), RegistrationState::Failing);

        assert_eq!(
            manager.health_check(t0 + Duration::from_millis(100)),
            HealthStatus::Recovered
        );
        assert_eq!(backend.active_count(), 1);
        backend.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_uninstalls() {
        let backend = FakeHotkeyBackend::new();
        {
            let mut manager = HotkeyManager::new(Box::new(backend.clone()), policy());
            let (_, callback) = counter();
            manager.register("ctrl+alt+f", callback).unwrap();
            assert_eq!(backend.active_count(), 1);
        }
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn health_monitor_reports_recovery_and_stops_with_manager() {
        let backend = FakeHotkeyBackend::new();
        let manager = Arc::new(Mutex::new(HotkeyManager::new(
            Box::new(backend.clone()),
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                max_attempts: 5,
            },
        )));
        let (_, callback) = counter();
        manager.lock().register("ctrl+alt+f", callback).unwrap();
        backend.drop_registration();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let mut monitor = HealthMonitor::spawn(
            Arc::downgrade(&manager),
            Duration::from_millis(10),
            move |status| {
                let _ = tx.lock().send(status);
            },
        );

        let status = rx.recv_timeout(Duration::from_secs(5)).expect("recovery reported");
        assert_eq!(status, HealthStatus::Recovered);
        assert_eq!(manager.lock().state(), RegistrationState::Registered);

        drop(manager);
        monitor.stop();
    }
}
