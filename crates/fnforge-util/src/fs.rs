//! Filesystem utilities for fnforge.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Copy a directory tree verbatim, preserving its internal structure.
///
/// # Errors
/// Returns an error if any entry cannot be read or written.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), UtilError> {
    ensure_dir(dest)?;

    let entries = std::fs::read_dir(src).map_err(|source| UtilError::Io {
        path: src.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: src.display().to_string(),
            source,
        })?;
        let from = entry.path();
        let to = dest.join(entry.file_name());

        if from.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|source| UtilError::Io {
                path: to.display().to_string(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Copy every regular file found under `src` (recursively) directly into
/// `dest`, discarding intermediate directory structure. Later files win on
/// name collision.
///
/// # Errors
/// Returns an error if any entry cannot be read or written.
pub fn flatten_files(src: &Path, dest: &Path) -> Result<(), UtilError> {
    ensure_dir(dest)?;

    let entries = std::fs::read_dir(src).map_err(|source| UtilError::Io {
        path: src.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: src.display().to_string(),
            source,
        })?;
        let from = entry.path();

        if from.is_dir() {
            flatten_files(&from, dest)?;
        } else {
            let to = dest.join(entry.file_name());
            std::fs::copy(&from, &to).map_err(|source| UtilError::Io {
                path: to.display().to_string(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Atomically-ish replace `dest` with the fully-built `staging` directory.
///
/// The previous `dest` (if any) is moved aside first and only removed once
/// `staging` is in place, so a failure at any point leaves either the old or
/// the new directory at `dest`, never a half-written one.
///
/// # Errors
/// Returns an error if any rename or removal fails. When moving `staging`
/// into place fails, the previous `dest` is restored before returning.
pub fn replace_dir(staging: &Path, dest: &Path) -> Result<(), UtilError> {
    let io_err = |path: &Path, source: std::io::Error| UtilError::Io {
        path: path.display().to_string(),
        source,
    };

    // The suffix is appended to the whole name, never substituted for a
    // dot-segment of it: `fn.v2` backs up to `fn.v2.replaced`, so sibling
    // directories with dotted names are never touched.
    let Some(name) = dest.file_name() else {
        return Err(UtilError::InvalidPath {
            path: dest.display().to_string(),
        });
    };
    let mut backup_name = name.to_os_string();
    backup_name.push(".replaced");
    let backup = dest.with_file_name(backup_name);
    remove_dir_all_if_exists(&backup)?;

    let had_previous = dest.exists();
    if had_previous {
        std::fs::rename(dest, &backup).map_err(|source| io_err(dest, source))?;
    }

    if let Err(source) = std::fs::rename(staging, dest) {
        if had_previous {
            // Best effort: put the old artifact back.
            let _ = std::fs::rename(&backup, dest);
        }
        return Err(io_err(staging, source));
    }

    if had_previous {
        remove_dir_all_if_exists(&backup)?;
    }

    Ok(())
}

/// Find the first file in `dir` (non-recursive) whose name matches the glob
/// `pattern`. Entries are checked in sorted order so the result is
/// deterministic. Returns `Ok(None)` when the directory is unreadable or no
/// entry matches.
///
/// # Errors
/// Returns an error if the pattern is not a valid glob.
pub fn find_matching_file(dir: &Path, pattern: &str) -> Result<Option<PathBuf>, UtilError> {
    let compiled = glob::Pattern::new(pattern).map_err(|e| UtilError::GlobPattern {
        pattern: pattern.to_owned(),
        message: e.to_string(),
    })?;

    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(None);
    };

    let mut names: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    names.sort();

    Ok(names.into_iter().find(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| compiled.matches(n))
    }))
}
