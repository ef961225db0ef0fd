//! Slot metadata persisted as `info.json` inside each slot directory.

use crate::utils::{PregenError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reserved metadata file name inside a slot directory
pub const SLOT_INFO_FILE: &str = "info.json";

/// Metadata for one archived slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
    /// Creation time, seconds since the Unix epoch
    #[serde(default)]
    pub timestamp: f64,

    /// Set once the slot has been loaded into the server
    #[serde(default)]
    pub used: bool,

    #[serde(default)]
    pub comment: String,
}

impl SlotInfo {
    /// Fresh, unused metadata stamped with the current time
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            timestamp: now_timestamp(),
            used: false,
            comment: comment.into(),
        }
    }

    /// Read the metadata of the slot at `slot_dir`.
    ///
    /// Returns `None` when the directory or its metadata file is missing or
    /// the file cannot be parsed; such a directory is not a slot.
    pub fn load(slot_dir: &Path) -> Option<Self> {
        if !slot_dir.is_dir() {
            return None;
        }
        let content = fs::read_to_string(slot_dir.join(SLOT_INFO_FILE)).ok()?;
        match serde_json::from_str(&content) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Unreadable slot info in {}: {}", slot_dir.display(), e);
                None
            }
        }
    }

    /// Write the metadata into `slot_dir`
    pub fn save(&self, slot_dir: &Path) -> Result<()> {
        let path = slot_dir.join(SLOT_INFO_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|e| PregenError::fs(&path, e))
    }

    /// Creation time in local time, `YYYY-MM-DD_HH-MM-SS`
    pub fn formatted_time(&self) -> String {
        use chrono::TimeZone;

        let secs = self.timestamp.trunc() as i64;
        let nanos = (self.timestamp.fract() * 1e9) as u32;
        match chrono::Local.timestamp_opt(secs, nanos) {
            chrono::LocalResult::Single(time) | chrono::LocalResult::Ambiguous(time, _) => {
                time.format(super::SLOT_NAME_FORMAT).to_string()
            }
            chrono::LocalResult::None => String::from("unknown"),
        }
    }
}

/// A slot directory name together with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub info: SlotInfo,
}

pub(crate) fn now_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let info = SlotInfo::new("before the event");
        info.save(temp_dir.path())?;

        let loaded = SlotInfo::load(temp_dir.path()).expect("slot info should load");
        assert_eq!(loaded, info);
        assert!(!loaded.used);
        Ok(())
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(SLOT_INFO_FILE), r#"{"timestamp": 12.5}"#)?;

        let loaded = SlotInfo::load(temp_dir.path()).expect("slot info should load");
        assert_eq!(loaded.timestamp, 12.5);
        assert!(!loaded.used);
        assert!(loaded.comment.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupt_or_missing_info_is_not_a_slot() -> Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(SlotInfo::load(temp_dir.path()).is_none());

        fs::write(temp_dir.path().join(SLOT_INFO_FILE), "{ not json")?;
        assert!(SlotInfo::load(temp_dir.path()).is_none());

        assert!(SlotInfo::load(&temp_dir.path().join("absent")).is_none());
        Ok(())
    }

    #[test]
    fn test_formatted_time_shape() {
        let info = SlotInfo::new("");
        let formatted = info.formatted_time();
        assert_eq!(formatted.len(), "2024-01-01_00-00-00".len());
        assert_eq!(&formatted[10..11], "_");
    }
}
