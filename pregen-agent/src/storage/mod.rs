//! Slot archive on disk.
//!
//! The archive root holds one directory per slot. A slot directory contains a
//! verbatim copy of each archived world folder plus an `info.json` metadata
//! file; directories without readable metadata are not listed as slots but
//! are still reclaimed by [`SlotStore::auto_remove`].

pub mod slot;

pub use slot::{Slot, SlotInfo, SLOT_INFO_FILE};

use crate::config::Config;
use crate::fs::walker::calculate_total_size;
use crate::fs::{copy_path_filtered, remove_path, IgnoreList};
use crate::utils::{PregenError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, warn};

/// chrono format of a freshly allocated slot name
pub const SLOT_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Owner of the archive root
#[derive(Debug, Clone)]
pub struct SlotStore {
    root: PathBuf,
    server_path: PathBuf,
    ignore: IgnoreList,
}

impl SlotStore {
    /// Open the archive at `root`, creating it when missing
    pub fn new(root: impl Into<PathBuf>, server_path: impl Into<PathBuf>, ignore: IgnoreList) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PregenError::fs(&root, e))?;
        Ok(Self {
            root,
            server_path: server_path.into(),
            ignore,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.storage.backup_path,
            &config.server.path,
            IgnoreList::new(&config.storage.ignored_files),
        )
    }

    /// Archive root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List valid slots ordered by creation time, oldest first unless `reverse`.
    ///
    /// Used slots are skipped unless `include_used`. Entries without readable
    /// metadata are silently left out.
    pub fn list_slots(&self, include_used: bool, reverse: bool) -> Result<Vec<Slot>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PregenError::fs(&self.root, e)),
        };

        let mut slots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PregenError::fs(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match SlotInfo::load(&entry.path()) {
                Some(info) if include_used || !info.used => slots.push(Slot { name, info }),
                Some(_) => debug!("Skipping used slot {}", name),
                None => debug!("Skipping {}: no valid slot info", name),
            }
        }

        slots.sort_by(|a, b| a.info.timestamp.total_cmp(&b.info.timestamp));
        if reverse {
            slots.reverse();
        }
        Ok(slots)
    }

    /// Look up one valid slot by name, used or not
    pub fn get_slot(&self, name: &str) -> Result<Slot> {
        self.list_slots(true, false)?
            .into_iter()
            .find(|slot| slot.name == name)
            .ok_or_else(|| PregenError::SlotNotFound(name.to_string()))
    }

    /// Oldest slot that has not been loaded yet
    pub fn next_unused(&self) -> Result<Option<Slot>> {
        Ok(self.list_slots(false, false)?.into_iter().next())
    }

    /// Reserve a fresh slot directory named after the current local time.
    ///
    /// On collision a space and then `1`s are appended until a name is free.
    /// The directory is created exclusively, so two calls never share a name.
    pub fn allocate_slot(&self) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.root).map_err(|e| PregenError::fs(&self.root, e))?;

        let base = chrono::Local::now().format(SLOT_NAME_FORMAT).to_string();
        let mut candidate = base.clone();
        loop {
            let path = self.root.join(&candidate);
            match fs::create_dir(&path) {
                Ok(()) => return Ok((candidate, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if candidate == base {
                        candidate.push(' ');
                    }
                    candidate.push('1');
                }
                Err(e) => return Err(PregenError::fs(path, e)),
            }
        }
    }

    /// Archive the given world folders from the server path into a new slot.
    ///
    /// A world that is missing or fails to copy is skipped; the backup only
    /// fails with [`PregenError::ArchiveEmpty`] when nothing was archived, in
    /// which case the new slot directory is removed again.
    pub fn backup(&self, unit_names: &[String], comment: &str) -> Result<Slot> {
        let (name, slot_dir) = self.allocate_slot()?;

        let mut succeeded = 0usize;
        for unit in unit_names {
            let source = self.server_path.join(unit);
            let success = if fs::symlink_metadata(&source).is_ok() {
                let target = slot_dir.join(unit);
                match copy_path_filtered(&source, &target, false, &self.ignore) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Unable to copy file \"{}\": {}", unit, e);
                        let _ = remove_path(&target, true);
                        false
                    }
                }
            } else {
                debug!("File {}: File is not found", unit);
                false
            };
            debug!("World \"{}\": {}", unit, success);
            if success {
                succeeded += 1;
            }
        }

        if succeeded == 0 {
            fs::remove_dir_all(&slot_dir).map_err(|e| PregenError::fs(&slot_dir, e))?;
            return Err(PregenError::ArchiveEmpty);
        }

        let info = SlotInfo::new(comment);
        if let Err(e) = info.save(&slot_dir) {
            let _ = fs::remove_dir_all(&slot_dir);
            return Err(e);
        }

        info!(
            "Archived slot \"{}\" ({}/{} worlds)",
            name,
            succeeded,
            unit_names.len()
        );
        Ok(Slot { name, info })
    }

    /// Delete a slot directory
    pub fn remove_slot(&self, name: &str) -> Result<()> {
        let path = self
            .resolve_slot_path(name, false)?
            .ok_or_else(|| PregenError::SlotNotFound(name.to_string()))?;
        if !path.is_dir() {
            return Err(PregenError::SlotNotFound(name.to_string()));
        }
        fs::remove_dir_all(&path).map_err(|e| PregenError::fs(&path, e))?;
        info!("Removed slot \"{}\"", name);
        Ok(())
    }

    /// Delete every used slot, then sweep any entry that is not a valid slot.
    ///
    /// Both passes are best-effort. Returns the number of used slots removed.
    pub fn auto_remove(&self) -> Result<usize> {
        let mut removed = 0;
        for slot in self.list_slots(true, false)? {
            if !slot.info.used {
                continue;
            }
            let path = self.root.join(&slot.name);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!("Removed used slot {}", slot.name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove used slot {}: {}", slot.name, e),
            }
        }

        let entries = fs::read_dir(&self.root).map_err(|e| PregenError::fs(&self.root, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if SlotInfo::load(&path).is_some() {
                continue;
            }
            match remove_path(&path, true) {
                Ok(()) => debug!("Swept orphaned entry {}", path.display()),
                Err(e) => warn!("Failed to sweep {}: {}", path.display(), e),
            }
        }

        info!("Auto-removed {} used slot(s)", removed);
        Ok(removed)
    }

    /// Total size in bytes of the files inside a slot
    pub fn slot_size(&self, name: &str) -> Result<u64> {
        let path = self
            .resolve_slot_path(name, false)?
            .ok_or_else(|| PregenError::SlotNotFound(name.to_string()))?;
        calculate_total_size(&path).map_err(|e| PregenError::fs(path, e))
    }

    /// Flag a slot as consumed and persist its metadata
    pub fn mark_used(&self, name: &str) -> Result<()> {
        let path = self
            .resolve_slot_path(name, false)?
            .ok_or_else(|| PregenError::SlotNotFound(name.to_string()))?;
        let mut info =
            SlotInfo::load(&path).ok_or_else(|| PregenError::SlotNotFound(name.to_string()))?;
        info.used = true;
        info.save(&path)
    }

    /// Resolve a slot argument to its directory.
    ///
    /// A bare name is looked up under the archive root. Anything with more
    /// than one path component must be an existing directory whose parent is
    /// the archive root. Otherwise fails with [`PregenError::SlotNotFound`],
    /// or returns `None` when `allow_missing`.
    pub fn resolve_slot_path(&self, name: &str, allow_missing: bool) -> Result<Option<PathBuf>> {
        let resolved = if is_bare_name(name) {
            let path = self.root.join(name);
            path.is_dir().then_some(path)
        } else {
            self.resolve_child_path(Path::new(name))
        };

        match resolved {
            Some(path) => Ok(Some(path)),
            None if allow_missing => Ok(None),
            None => Err(PregenError::SlotNotFound(name.to_string())),
        }
    }

    fn resolve_child_path(&self, path: &Path) -> Option<PathBuf> {
        if !path.is_dir() {
            return None;
        }
        let canonical = fs::canonicalize(path).ok()?;
        let root = fs::canonicalize(&self.root).ok()?;
        if canonical.parent() != Some(root.as_path()) {
            debug!("{} is not inside the archive root", path.display());
            return None;
        }
        canonical.file_name().map(|file_name| self.root.join(file_name))
    }
}

fn is_bare_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
