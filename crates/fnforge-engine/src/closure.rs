//! Local dependency closure assembly with cycle and ambiguity detection.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use fnforge_config::manifest::{parse_manifest, DependencySource};
use fnforge_config::Runtime;

use crate::error::EngineError;
use crate::locate::ManifestLocation;

/// A registry dependency, recorded verbatim; fetching it is the external
/// tool's responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPackage {
    pub name: String,
    pub version: String,
}

/// The deduplicated set of local module paths that must ship with a
/// function, plus the named registry packages from its manifest.
#[derive(Debug, Clone, Default)]
pub struct DependencyClosure {
    /// Canonical local dependency paths. Ordered for determinism; insertion
    /// order carries no meaning.
    pub local_paths: BTreeSet<PathBuf>,
    /// Registry packages declared in the function's manifest.
    pub external: Vec<ExternalPackage>,
}

/// White/gray/black marking for the dependency walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InStack,
    Done,
}

/// Build the dependency closure for a located manifest.
///
/// Local-path entries resolve relative to the directory declaring them and
/// are canonicalized; each local dependency's own manifest (when present) is
/// walked recursively, so closures cross several manifests. The walk keeps
/// an explicit visited map keyed by canonical path: revisiting a path still
/// on the walk stack is a cycle, revisiting a finished path is diamond
/// deduplication.
///
/// `extra_includes` are canonicalized and unioned in verbatim, but must lie
/// under the source root or the manifest root; anything else is a
/// configuration error, not something to resolve silently.
///
/// # Errors
/// Returns a parse error from any visited manifest, `DependencyNotFound`
/// for a dangling local path, `CyclicDependency`, `AmbiguousDependency`, or
/// `IncludeOutsideScope`.
pub fn build_closure(
    location: &ManifestLocation,
    runtime: Runtime,
    extra_includes: &[PathBuf],
    source_root: &Path,
) -> Result<DependencyClosure, EngineError> {
    let mut closure = DependencyClosure::default();
    let mut marks: HashMap<PathBuf, Mark> = HashMap::new();
    let mut declared_names: HashMap<PathBuf, String> = HashMap::new();
    let mut stack: Vec<String> = Vec::new();

    let root_dir = canonicalize(&location.manifest_root, "manifest root")?;
    walk(
        &location.manifest_path,
        &root_dir,
        "root manifest",
        runtime,
        true,
        &mut closure,
        &mut marks,
        &mut declared_names,
        &mut stack,
    )?;

    let source_scope = source_root
        .canonicalize()
        .unwrap_or_else(|_| source_root.to_path_buf());
    for include in extra_includes {
        let canonical = canonicalize(include, "include path")?;
        let in_scope = canonical.starts_with(&source_scope) || canonical.starts_with(&root_dir);
        if !in_scope {
            return Err(EngineError::IncludeOutsideScope {
                path: canonical.display().to_string(),
            });
        }
        closure.local_paths.insert(canonical);
    }

    Ok(closure)
}

/// Visit one manifest-owning directory: record its dependencies and recurse
/// into local ones.
#[allow(clippy::too_many_arguments)]
fn walk(
    manifest_path: &Path,
    dir: &Path,
    name: &str,
    runtime: Runtime,
    is_root: bool,
    closure: &mut DependencyClosure,
    marks: &mut HashMap<PathBuf, Mark>,
    declared_names: &mut HashMap<PathBuf, String>,
    stack: &mut Vec<String>,
) -> Result<(), EngineError> {
    match marks.get(dir) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InStack) => {
            stack.push(name.to_owned());
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let cycle = stack.get(start..).unwrap_or(stack.as_slice()).join(" -> ");
            return Err(EngineError::CyclicDependency { cycle });
        }
        None => {}
    }

    marks.insert(dir.to_path_buf(), Mark::InStack);
    stack.push(name.to_owned());

    let entries = parse_manifest(manifest_path, runtime)?;

    for entry in entries {
        match entry.source {
            DependencySource::Registry { version } => {
                // External packages are recorded from the function's own
                // manifest only; transitive registry resolution belongs to
                // the external tool.
                if is_root {
                    closure.external.push(ExternalPackage {
                        name: entry.name,
                        version,
                    });
                }
            }
            DependencySource::Local { relative_path } => {
                let resolved = dir.join(&relative_path);
                let canonical =
                    resolved
                        .canonicalize()
                        .map_err(|_| EngineError::DependencyNotFound {
                            name: entry.name.clone(),
                            path: resolved.display().to_string(),
                        })?;

                check_ambiguity(&canonical, &entry.name, declared_names)?;
                closure.local_paths.insert(canonical.clone());

                // Recurse into the dependency's own manifest, if it has one.
                let dep_manifest = fnforge_util::fs::find_matching_file(
                    &canonical,
                    runtime.default_manifest_pattern(),
                )?;
                match dep_manifest {
                    Some(dep_manifest_path) => walk(
                        &dep_manifest_path,
                        &canonical,
                        &entry.name,
                        runtime,
                        false,
                        closure,
                        marks,
                        declared_names,
                        stack,
                    )?,
                    None => {
                        // Leaf module with no manifest of its own; mark done
                        // so a later revisit is deduplicated, not re-walked.
                        marks.insert(canonical, Mark::Done);
                    }
                }
            }
        }
    }

    marks.insert(dir.to_path_buf(), Mark::Done);
    stack.pop();

    Ok(())
}

/// Two distinct declared names for one canonical path usually means a
/// packaging misconfiguration; refuse rather than deduplicate silently.
fn check_ambiguity(
    canonical: &Path,
    name: &str,
    declared_names: &mut HashMap<PathBuf, String>,
) -> Result<(), EngineError> {
    match declared_names.get(canonical) {
        Some(existing) if existing != name => Err(EngineError::AmbiguousDependency {
            first: existing.clone(),
            second: name.to_owned(),
            path: canonical.display().to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            declared_names.insert(canonical.to_path_buf(), name.to_owned());
            Ok(())
        }
    }
}

fn canonicalize(path: &Path, what: &str) -> Result<PathBuf, EngineError> {
    path.canonicalize().map_err(|source| EngineError::Io {
        path: format!("{what} {}", path.display()),
        source,
    })
}
