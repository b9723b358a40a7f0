//! Custom error types for Process Freezer

use std::time::Duration;

use thiserror::Error;

/// Main error type for freeze/resume and registry operations
#[derive(Error, Debug)]
pub enum FreezerError {
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    #[error("Process identifier must not be empty")]
    InvalidIdentifier,

    #[error("External action failed for {identifier}: {diagnostic}")]
    ExternalActionFailed {
        identifier: String,
        diagnostic: String,
    },

    #[error("External action for {identifier} did not finish within {timeout:?}")]
    Timeout {
        identifier: String,
        timeout: Duration,
    },

    #[error("An action for {0} is already in progress")]
    Busy(String),

    #[error("Window operation failed: {0}")]
    WindowOperationFailed(String),

    #[error("Hotkey registration failed: {0}")]
    HotkeyRegistrationFailed(String),

    #[error("Invalid hotkey: {0}")]
    InvalidHotkey(String),

    #[error("Failed to load process registry: {0}")]
    PersistenceLoadFailed(String),

    #[error("Failed to save process registry: {0}")]
    PersistenceWriteFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsApi(#[from] windows::core::Error),
}

impl FreezerError {
    /// Text shown to the user when an operation did not succeed.
    ///
    /// External tool failures surface the captured diagnostic verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::ExternalActionFailed { diagnostic, .. } => diagnostic.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for Process Freezer operations
pub type FreezerResult<T> = Result<T, FreezerError>;
