//! Dependency manifest parsing.
//!
//! The on-disk manifest formats belong to the external tool ecosystems
//! (`package.json` for npm/esbuild, `.csproj` for MSBuild). This module only
//! extracts the declared dependency entries and classifies each as a local
//! filesystem reference or a named registry package; everything else in the
//! file is the external tool's business.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::spec::Runtime;

/// Where a declared dependency comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// A relative filesystem path, to be bundled into the artifact.
    Local { relative_path: String },
    /// A registry package, resolved and fetched by the external tool.
    Registry { version: String },
}

/// One declared dependency entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    /// Declared name (package name, or project file stem for `.csproj`
    /// references).
    pub name: String,
    /// Local path or registry version, taken verbatim from the manifest.
    pub source: DependencySource,
}

/// Read and parse the manifest at `path` for the given runtime family.
///
/// # Errors
/// Returns an error if the file cannot be read or does not parse as the
/// runtime's manifest format.
pub fn parse_manifest(path: &Path, runtime: Runtime) -> Result<Vec<DependencyEntry>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.display().to_string(),
        source,
    })?;

    match runtime {
        Runtime::Nodejs => parse_package_json(&content, path),
        Runtime::Dotnet => parse_msbuild_project(&content, path),
    }
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

fn parse_package_json(content: &str, path: &Path) -> Result<Vec<DependencyEntry>, ManifestError> {
    let parsed: PackageJson =
        serde_json::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    Ok(parsed
        .dependencies
        .into_iter()
        .map(|(name, requirement)| DependencyEntry {
            source: classify_npm_requirement(&requirement),
            name,
        })
        .collect())
}

/// Classify an npm requirement string: `file:` URLs and bare relative paths
/// are local, everything else is a registry version requirement.
fn classify_npm_requirement(requirement: &str) -> DependencySource {
    if let Some(stripped) = requirement.strip_prefix("file:") {
        return DependencySource::Local {
            relative_path: stripped.to_owned(),
        };
    }
    if requirement.starts_with("./") || requirement.starts_with("../") {
        return DependencySource::Local {
            relative_path: requirement.to_owned(),
        };
    }
    DependencySource::Registry {
        version: requirement.to_owned(),
    }
}

fn parse_msbuild_project(content: &str, path: &Path) -> Result<Vec<DependencyEntry>, ManifestError> {
    let doc = roxmltree::Document::parse(content).map_err(|e| ManifestError::ParseXml {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::new();

    for node in doc.descendants() {
        match node.tag_name().name() {
            "ProjectReference" => {
                let Some(include) = node.attribute("Include") else {
                    continue;
                };
                // MSBuild paths use backslashes regardless of host OS.
                let relative_path = include.replace('\\', "/");
                let name = Path::new(&relative_path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(include)
                    .to_owned();
                entries.push(DependencyEntry {
                    name,
                    source: DependencySource::Local {
                        relative_path: referenced_project_dir(&relative_path),
                    },
                });
            }
            "PackageReference" => {
                let Some(name) = node.attribute("Include") else {
                    continue;
                };
                let version = node
                    .attribute("Version")
                    .map(str::to_owned)
                    .or_else(|| {
                        node.children()
                            .find(|c| c.tag_name().name() == "Version")
                            .and_then(|c| c.text())
                            .map(str::to_owned)
                    })
                    .unwrap_or_default();
                entries.push(DependencyEntry {
                    name: name.to_owned(),
                    source: DependencySource::Registry { version },
                });
            }
            _ => {}
        }
    }

    Ok(entries)
}

/// A `ProjectReference` points at a `.csproj` file; the local dependency is
/// the directory containing it.
fn referenced_project_dir(relative_path: &str) -> String {
    Path::new(relative_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_owned())
}

/// Errors produced by manifest parsing.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file cannot be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// The manifest is not valid JSON for its format.
    #[error("invalid manifest at {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    /// The manifest is not a valid MSBuild project file.
    #[error("invalid project file at {path}: {message}")]
    ParseXml { path: String, message: String },
}
