//! Process registry
//!
//! Durable mapping from process identifier to display name and the last
//! confirmed frozen state. Every mutation rewrites the whole file before
//! returning; the in-memory copy stays authoritative if a write fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FreezerError, FreezerResult};
use crate::utils::write_atomic;

/// Store shared between the UI thread, the dispatcher and action threads
pub type SharedStore = Arc<Mutex<ProcessStore>>;

/// One registered process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub identifier: String,
    pub display_name: String,
    pub desired_frozen: bool,
}

impl ProcessRecord {
    fn new(identifier: String, display_name: &str, desired_frozen: bool) -> Self {
        let display_name = match display_name.trim() {
            "" => identifier.clone(),
            name => name.to_string(),
        };
        Self {
            identifier,
            display_name,
            desired_frozen,
        }
    }
}

/// On-disk shape of a record value; keys match the original `processes.json`
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_frozen: bool,
}

/// Registry of processes, persisted as a JSON object keyed by identifier
#[derive(Debug)]
pub struct ProcessStore {
    path: PathBuf,
    records: Vec<ProcessRecord>,
}

impl ProcessStore {
    /// Load the registry at `path`.
    ///
    /// A missing file is an empty registry. A file that cannot be read or
    /// parsed is logged and also yields an empty registry so the application
    /// stays usable; the broken file is only replaced by the next mutation.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = if path.exists() {
            match Self::read(&path) {
                Ok(records) => {
                    info!("Loaded {} process(es) from {:?}", records.len(), path);
                    records
                }
                Err(e) => {
                    warn!("{}; starting with an empty registry", e);
                    Vec::new()
                }
            }
        } else {
            debug!("No registry at {:?}; starting empty", path);
            Vec::new()
        };

        Self { path, records }
    }

    /// Wrap in the shared handle used across threads
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    fn read(path: &Path) -> FreezerResult<Vec<ProcessRecord>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FreezerError::PersistenceLoadFailed(format!("{:?}: {}", path, e)))?;
        let map: Map<String, Value> = serde_json::from_str(&content)
            .map_err(|e| FreezerError::PersistenceLoadFailed(format!("{:?}: {}", path, e)))?;

        let mut records = Vec::with_capacity(map.len());
        for (key, value) in map {
            let identifier = key.trim().to_string();
            if identifier.is_empty() {
                warn!("Skipping registry entry with an empty identifier");
                continue;
            }
            if records
                .iter()
                .any(|r: &ProcessRecord| r.identifier == identifier)
            {
                warn!("Skipping duplicate registry entry {:?}", identifier);
                continue;
            }
            match serde_json::from_value::<StoredRecord>(value) {
                Ok(stored) => {
                    records.push(ProcessRecord::new(identifier, &stored.name, stored.is_frozen))
                }
                Err(e) => warn!("Skipping malformed registry entry {:?}: {}", identifier, e),
            }
        }
        Ok(records)
    }

    /// Rewrite the whole registry file
    pub fn save(&self) -> FreezerResult<()> {
        let mut map = Map::new();
        for record in &self.records {
            let stored = StoredRecord {
                name: record.display_name.clone(),
                is_frozen: record.desired_frozen,
            };
            let value = serde_json::to_value(stored)
                .map_err(|e| FreezerError::PersistenceWriteFailed(e.to_string()))?;
            map.insert(record.identifier.clone(), value);
        }

        let content = serde_json::to_string_pretty(&map)
            .map_err(|e| FreezerError::PersistenceWriteFailed(e.to_string()))?;
        write_atomic(&self.path, content.as_bytes()).map_err(|e| {
            warn!("Failed to write registry {:?}: {}", self.path, e);
            FreezerError::PersistenceWriteFailed(format!("{:?}: {}", self.path, e))
        })?;
        debug!("Registry saved ({} entries)", self.records.len());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in insertion order
    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn get(&self, identifier: &str) -> Option<&ProcessRecord> {
        self.records.iter().find(|r| r.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn frozen_count(&self) -> usize {
        self.records.iter().filter(|r| r.desired_frozen).count()
    }

    /// Register a process, or rename an existing one.
    ///
    /// Re-adding an identifier keeps its frozen state.
    pub fn add(&mut self, identifier: &str, display_name: &str) -> FreezerResult<()> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(FreezerError::InvalidIdentifier);
        }

        match self.records.iter_mut().find(|r| r.identifier == identifier) {
            Some(existing) => {
                let renamed = ProcessRecord::new(
                    identifier.to_string(),
                    display_name,
                    existing.desired_frozen,
                );
                info!(
                    "Updating process {:?}: name {:?} -> {:?}",
                    identifier, existing.display_name, renamed.display_name
                );
                *existing = renamed;
            }
            None => {
                info!("Adding process {:?}", identifier);
                self.records
                    .push(ProcessRecord::new(identifier.to_string(), display_name, false));
            }
        }
        self.save()
    }

    /// Forget a process. Returns whether it was registered.
    pub fn remove(&mut self, identifier: &str) -> FreezerResult<bool> {
        let Some(pos) = self.records.iter().position(|r| r.identifier == identifier) else {
            return Ok(false);
        };
        let removed = self.records.remove(pos);
        if removed.desired_frozen {
            warn!(
                "Removing {:?} while it is recorded as frozen; it will stay suspended",
                identifier
            );
        } else {
            info!("Removing process {:?}", identifier);
        }
        self.save()?;
        Ok(true)
    }

    /// Record the confirmed frozen state of a registered process
    pub fn set_frozen(&mut self, identifier: &str, frozen: bool) -> FreezerResult<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.identifier == identifier)
            .ok_or_else(|| FreezerError::UnknownProcess(identifier.to_string()))?;
        record.desired_frozen = frozen;
        self.save()
    }
}
