//! Directory traversal for slot size accounting.

use std::path::Path;
use walkdir::WalkDir;

/// Walk a directory tree calling `callback` with the path and size of every
/// non-directory entry. Symbolic links are not followed.
fn walk_files<F>(root: &Path, mut callback: F) -> std::io::Result<()>
where
    F: FnMut(&Path, u64),
{
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let metadata = entry.metadata()?;
        callback(entry.path(), metadata.len());
    }

    Ok(())
}

/// Calculate total size of all files in a directory
pub fn calculate_total_size(root: &Path) -> std::io::Result<u64> {
    let mut total_size = 0u64;
    walk_files(root, |_, size| total_size += size)?;
    Ok(total_size)
}
