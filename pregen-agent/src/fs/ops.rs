//! Copy and remove primitives over files and directory trees.
//!
//! Missing sources are tolerated by default: callers that need a hard
//! failure pass `allow_not_found = false`.

use crate::utils::{PregenError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// File name patterns excluded from a copy
///
/// A pattern starting with `*` matches by suffix, one ending with `*` matches
/// by prefix, anything else must equal the file name.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<String>,
}

impl IgnoreList {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns.iter().filter(|p| !p.is_empty()).cloned().collect(),
        }
    }

    pub fn is_ignored(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                file_name.ends_with(suffix)
            } else if let Some(prefix) = pattern.strip_suffix('*') {
                file_name.starts_with(prefix)
            } else {
                file_name == pattern
            }
        })
    }
}

/// Copy a file or a directory tree from `src` to `dst`
pub fn copy_path(src: &Path, dst: &Path, allow_not_found: bool) -> Result<()> {
    copy_path_filtered(src, dst, allow_not_found, &IgnoreList::default())
}

/// Copy a file or a directory tree, skipping entries whose name is ignored
///
/// Directories are merged into an existing destination. Symlinks are
/// recreated as links rather than followed.
pub fn copy_path_filtered(
    src: &Path,
    dst: &Path,
    allow_not_found: bool,
    ignore: &IgnoreList,
) -> Result<()> {
    let metadata = match fs::symlink_metadata(src) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("File {} not found", src.display());
            if allow_not_found {
                return Ok(());
            }
            return Err(PregenError::fs(src, e));
        }
        Err(e) => return Err(PregenError::fs(src, e)),
    };

    if metadata.is_dir() {
        copy_tree(src, dst, ignore)?;
        debug!("Copied folder \"{}\" to \"{}\"", src.display(), dst.display());
    } else {
        copy_entry(src, dst, &metadata)?;
        debug!("Copied file \"{}\" to \"{}\"", src.display(), dst.display());
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path, ignore: &IgnoreList) -> Result<()> {
    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !ignore.is_ignored(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            PregenError::fs(path, e.into())
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| PregenError::fs(&target, e))?;
        } else {
            let metadata = entry
                .metadata()
                .map_err(|e| PregenError::fs(entry.path(), e.into()))?;
            copy_entry(entry.path(), &target, &metadata)?;
        }
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, metadata: &fs::Metadata) -> Result<()> {
    #[cfg(unix)]
    if metadata.file_type().is_symlink() {
        let link = fs::read_link(src).map_err(|e| PregenError::fs(src, e))?;
        std::os::unix::fs::symlink(&link, dst).map_err(|e| PregenError::fs(dst, e))?;
        return Ok(());
    }
    #[cfg(not(unix))]
    let _ = metadata;

    fs::copy(src, dst).map_err(|e| PregenError::fs(dst, e))?;
    Ok(())
}

/// Remove a file or a directory tree
pub fn remove_path(path: &Path, allow_not_found: bool) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("File {} not found", path.display());
            if allow_not_found {
                return Ok(());
            }
            return Err(PregenError::fs(path, e));
        }
        Err(e) => return Err(PregenError::fs(path, e)),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(|e| PregenError::fs(path, e))?;
        debug!("Removed folder \"{}\"", path.display());
    } else {
        fs::remove_file(path).map_err(|e| PregenError::fs(path, e))?;
        debug!("Removed file \"{}\"", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("a.txt");
        let dst = temp_dir.path().join("b.txt");
        fs::write(&src, b"content")?;

        copy_path(&src, &dst, false)?;
        assert_eq!(fs::read(&dst)?, b"content");
        Ok(())
    }

    #[test]
    fn test_copy_tree_recursively() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("world");
        fs::create_dir_all(src.join("region"))?;
        fs::write(src.join("level.dat"), b"level")?;
        fs::write(src.join("region/r.0.0.mca"), b"chunks")?;

        let dst = temp_dir.path().join("copy");
        copy_path(&src, &dst, false)?;

        assert_eq!(fs::read(dst.join("level.dat"))?, b"level");
        assert_eq!(fs::read(dst.join("region/r.0.0.mca"))?, b"chunks");
        Ok(())
    }

    #[test]
    fn test_copy_missing_source() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let missing = temp_dir.path().join("missing");
        let dst = temp_dir.path().join("dst");

        copy_path(&missing, &dst, true)?;
        assert!(!dst.exists());

        let err = copy_path(&missing, &dst, false).unwrap_err();
        assert!(matches!(err, PregenError::Filesystem { .. }));
        Ok(())
    }

    #[test]
    fn test_copy_skips_ignored_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("world");
        fs::create_dir_all(&src)?;
        fs::write(src.join("level.dat"), b"level")?;
        fs::write(src.join("session.lock"), b"lock")?;
        fs::write(src.join("debug.log"), b"log")?;

        let ignore = IgnoreList::new(&["session.lock".to_string(), "*.log".to_string()]);
        let dst = temp_dir.path().join("copy");
        copy_path_filtered(&src, &dst, false, &ignore)?;

        assert!(dst.join("level.dat").exists());
        assert!(!dst.join("session.lock").exists());
        assert!(!dst.join("debug.log").exists());
        Ok(())
    }

    #[test]
    fn test_ignore_list_patterns() {
        let ignore = IgnoreList::new(&[
            "session.lock".to_string(),
            "*.tmp".to_string(),
            "cache*".to_string(),
            String::new(),
        ]);
        assert!(ignore.is_ignored("session.lock"));
        assert!(ignore.is_ignored("chunk.tmp"));
        assert!(ignore.is_ignored("cache_01"));
        assert!(!ignore.is_ignored("level.dat"));
        assert!(!ignore.is_ignored(""));
    }

    #[test]
    fn test_remove_file_and_tree() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("file.txt");
        let dir = temp_dir.path().join("dir");
        fs::write(&file, b"x")?;
        fs::create_dir_all(dir.join("nested"))?;
        fs::write(dir.join("nested/y"), b"y")?;

        remove_path(&file, false)?;
        remove_path(&dir, false)?;
        assert!(!file.exists());
        assert!(!dir.exists());

        remove_path(&dir, true)?;
        assert!(remove_path(&dir, false).is_err());
        Ok(())
    }
}
