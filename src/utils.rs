//! Utility functions and helpers for Process Freezer

use std::fs;
use std::io::Write;
use std::path::Path;

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// over the target, so a crash never leaves a truncated file behind.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

/// Truncate a string to at most `max_chars` characters, appending "..." when cut
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Convert a Rust string to a wide string for Windows API
#[cfg(windows)]
pub fn to_wide_string(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Create a PCWSTR from a wide string slice
#[cfg(windows)]
pub fn to_pcwstr(s: &[u16]) -> windows::core::PCWSTR {
    windows::core::PCWSTR::from_raw(s.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_string("notepad", 10), "notepad");
        assert_eq!(truncate_string("a-very-long-name", 8), "a-ver...");
    }
}
