//! Filesystem helpers for working directories

use crate::error::{CacheError, CacheResult};
use filetime::FileTime;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use walkdir::WalkDir;

/// Set the access and modification times of everything under `root`
/// (including `root` itself) to the epoch. Symlinks are not followed.
pub fn zero_mtime(root: &Path) -> CacheResult<()> {
    let zero = FileTime::zero();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            CacheError::Internal(format!("walking {}: {}", root.display(), e))
        })?;
        filetime::set_symlink_file_times(entry.path(), zero, zero).map_err(|e| {
            CacheError::io(format!("resetting mtime of {}", entry.path().display()), e)
        })?;
    }
    Ok(())
}

/// Number of hard links to a regular file
pub fn link_count(metadata: &fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.nlink()
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        1
    }
}

/// True for regular files nothing else links to, i.e. content that is not
/// already shared with the store
pub fn is_unshared_file(metadata: &fs::Metadata) -> bool {
    metadata.file_type().is_file() && link_count(metadata) == 1
}

/// Delete `dir` and everything in it (if present), then create it empty
pub fn recreate_dir(dir: &Path) -> CacheResult<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(CacheError::io(format!("deleting {}", dir.display()), e)),
    }
    fs::create_dir_all(dir).map_err(|e| CacheError::io(format!("creating {}", dir.display()), e))
}

/// Relative path with `/` separators, as recorded in trees and diffs.
///
/// Fails on names that are not UTF-8 rather than altering them.
pub fn rel_string(path: &Path) -> CacheResult<String> {
    let parts = path
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| CacheError::NonUtf8Path(path.to_path_buf()))?;
    Ok(parts.join("/"))
}

/// UTF-8 form of a name found at `path`
pub fn utf8_name<'a>(name: &'a OsStr, path: &Path) -> CacheResult<&'a str> {
    name.to_str()
        .ok_or_else(|| CacheError::NonUtf8Path(path.to_path_buf()))
}
