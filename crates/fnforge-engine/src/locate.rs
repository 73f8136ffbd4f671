//! Manifest discovery across directory boundaries.
//!
//! Dependency manifests do not always live next to the function source
//! (shared manifests one or two directories up are common), so discovery
//! either honors an explicitly pinned manifest root or walks a bounded
//! number of ancestor directories.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// The resolved manifest and the directory that owns it.
///
/// The manifest root is the working directory for the external build tool;
/// it may differ from the function's source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    /// Absolute path to the manifest file.
    pub manifest_path: PathBuf,
    /// Directory containing the manifest.
    pub manifest_root: PathBuf,
}

/// Locate the dependency manifest for a function.
///
/// With `explicit_root` set, the manifest must exist directly under that
/// directory — absence is a hard failure with no fallback search. Otherwise
/// the search starts at `source_root` and climbs at most `max_ascent`
/// ancestor directories, stopping at the first directory containing a file
/// matching `pattern`.
///
/// Read-only; no state is shared between invocations.
///
/// # Errors
/// Returns [`EngineError::ManifestNotFound`] when no match exists within the
/// search scope, naming the pattern and the search root.
pub fn locate(
    source_root: &Path,
    pattern: &str,
    explicit_root: Option<&Path>,
    max_ascent: usize,
) -> Result<ManifestLocation, EngineError> {
    if let Some(root) = explicit_root {
        let Some(found) = fnforge_util::fs::find_matching_file(root, pattern)? else {
            return Err(EngineError::ManifestNotFound {
                pattern: pattern.to_owned(),
                search_root: root.display().to_string(),
            });
        };
        return Ok(ManifestLocation {
            manifest_root: root.to_path_buf(),
            manifest_path: found,
        });
    }

    let mut dir = source_root;
    for _ in 0..=max_ascent {
        if let Some(found) = fnforge_util::fs::find_matching_file(dir, pattern)? {
            return Ok(ManifestLocation {
                manifest_root: dir.to_path_buf(),
                manifest_path: found,
            });
        }
        let Some(parent) = dir.parent() else {
            break;
        };
        dir = parent;
    }

    Err(EngineError::ManifestNotFound {
        pattern: pattern.to_owned(),
        search_root: source_root.display().to_string(),
    })
}
