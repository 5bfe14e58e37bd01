//! Settings collaborator: window geometry + quick-folder slots, JSON file
//! under the platform config dir. Loading tolerates a missing or corrupt
//! file (defaults win); the collection never touches this — the driver
//! passes the loaded values down.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quick-folder slots are keys 1 through 6.
pub const QUICK_SLOT_MIN: u8 = 1;
pub const QUICK_SLOT_MAX: u8 = 6;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub window_w: u32,
    pub window_h: u32,
    /// Slot index (1..=6) → absolute folder path.
    pub quick_folders: BTreeMap<u8, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            window_w: 800,
            window_h: 600,
            quick_folders: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from `path`; a missing or unreadable file yields the defaults.
    pub fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("settings: corrupt {}: {}", path.display(), e);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        eprintln!("settings: saved {}", path.display());
        Ok(())
    }

    /// Assign a quick folder. Returns false for an out-of-range slot.
    pub fn set_quick_folder(&mut self, slot: u8, folder: String) -> bool {
        if !(QUICK_SLOT_MIN..=QUICK_SLOT_MAX).contains(&slot) {
            return false;
        }
        if folder.is_empty() {
            self.quick_folders.remove(&slot);
        } else {
            self.quick_folders.insert(slot, folder);
        }
        true
    }

    pub fn quick_folder(&self, slot: u8) -> Option<&str> {
        self.quick_folders.get(&slot).map(String::as_str)
    }
}

/// Default location: platform config dir, `settings.json`.
pub fn settings_file() -> Option<PathBuf> {
    ProjectDirs::from("org", "wiv", "wiv").map(|d| d.config_dir().join("settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!((s.window_w, s.window_h), (800, 600));
        assert!(s.quick_folders.is_empty());
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conf/settings.json");
        let mut s = Settings::default();
        s.window_w = 1280;
        s.window_h = 720;
        assert!(s.set_quick_folder(1, "/photos/keep".into()));
        assert!(s.set_quick_folder(6, "/photos/sort".into()));
        s.save(&file).unwrap();

        let loaded = Settings::load(&file);
        assert_eq!(loaded, s);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("nope.json"));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, b"{ not json").unwrap();
        let s = Settings::load(&file);
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn slot_range_enforced() {
        let mut s = Settings::default();
        assert!(!s.set_quick_folder(0, "/x".into()));
        assert!(!s.set_quick_folder(7, "/x".into()));
        assert!(s.set_quick_folder(3, "/x".into()));
        assert_eq!(s.quick_folder(3), Some("/x"));
    }

    #[test]
    fn empty_assignment_clears_slot() {
        let mut s = Settings::default();
        s.set_quick_folder(2, "/x".into());
        s.set_quick_folder(2, String::new());
        assert_eq!(s.quick_folder(2), None);
    }
}
