//! Process lookup
//!
//! Resolves a symbolic identifier (an image name such as `notepad.exe`, or a
//! decimal pid) to the numeric process ids currently using it.

use std::path::Path;

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Maps identifiers to live numeric process ids
pub trait ProcessTable: Send + Sync {
    /// Sorted, deduplicated pids currently behind `identifier`; empty when none run
    fn pids_for(&self, identifier: &str) -> Vec<u32>;

    fn is_running(&self, identifier: &str) -> bool {
        !self.pids_for(identifier).is_empty()
    }
}

/// Process table backed by a fresh `sysinfo` snapshot per query
#[derive(Debug, Default)]
pub struct SysinfoProcessTable;

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> System {
        System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::new()))
    }

    /// Distinct image names of `pids`, sorted case-insensitively
    pub fn image_names(&self, pids: &[u32]) -> Vec<String> {
        let system = Self::snapshot();
        let mut names: Vec<String> = pids
            .iter()
            .filter_map(|pid| system.process(Pid::from_u32(*pid)))
            .map(|p| p.name().to_string_lossy().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort_by_key(|name| name.to_lowercase());
        names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        names
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn pids_for(&self, identifier: &str) -> Vec<u32> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Vec::new();
        }

        let system = Self::snapshot();

        if let Ok(pid) = identifier.parse::<u32>() {
            return if system.process(Pid::from_u32(pid)).is_some() {
                vec![pid]
            } else {
                Vec::new()
            };
        }

        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| name_matches(&process.name().to_string_lossy(), identifier))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }
}

/// Strip any directory part, handling both `/` and `\` separators
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn strip_exe(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

/// Case-insensitive image name comparison that tolerates a missing `.exe`
pub fn name_matches(image: &str, identifier: &str) -> bool {
    let image = base_name(image.trim());
    let identifier = base_name(identifier.trim());
    if image.is_empty() || identifier.is_empty() {
        return false;
    }
    image.eq_ignore_ascii_case(identifier)
        || strip_exe(image).eq_ignore_ascii_case(strip_exe(identifier))
}

/// Display name suggested for an image, e.g. `notepad.exe` -> `Notepad`
pub fn display_name_for(image: &str) -> String {
    let stem = Path::new(base_name(image))
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
