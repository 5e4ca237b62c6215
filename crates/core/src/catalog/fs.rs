//! Filesystem helpers for the storage directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::CatalogError;

/// Turn a user-supplied title into a single safe path component.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Pick the storage path for a new entity.
///
/// Uses `<root>/<title>` unless that path is taken, in which case the lowest
/// free `<title>_<n>` wins. `is_claimed` reports paths reserved by other
/// records that may not exist on disk yet.
pub fn unique_storage_path(
    root: &Path,
    title: &str,
    is_claimed: impl Fn(&Path) -> bool,
) -> PathBuf {
    let base = sanitize_title(title);
    let taken = |p: &Path| p.exists() || is_claimed(p);

    let candidate = root.join(&base);
    if !taken(&candidate) {
        return candidate;
    }

    let mut n: u32 = 1;
    loop {
        let candidate = root.join(format!("{}_{}", base, n));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Size of a file, or the recursive size of a directory.
pub fn path_size(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }

    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += path_size(&entry?.path())?;
    }
    Ok(total)
}

/// Delete a file or directory tree. A path that is already gone is not an error.
pub fn remove_path(path: &Path) -> Result<(), CatalogError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(CatalogError::Io(format!(
                "stat {}: {}",
                path.display(),
                e
            )))
        }
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| CatalogError::Io(format!("remove {}: {}", path.display(), e)))
}
