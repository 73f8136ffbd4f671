//! Builder-wide settings, read from `fnforge.toml` when present.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Settings shared by all function builds in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderSettings {
    /// Maximum number of functions built concurrently.
    pub workers: usize,
    /// Wall-clock budget for one external tool invocation, in seconds.
    pub tool_timeout_secs: u64,
    /// How many ancestor directories the manifest search may climb above the
    /// source root.
    pub max_manifest_ascent: usize,
    /// Cap on captured tool diagnostics, in bytes (head and tail preserved).
    pub diagnostics_cap_bytes: usize,
    /// Per-tool binary path overrides. When unset, tools are resolved from
    /// `PATH` by name.
    pub tool_paths: ToolPaths,
}

/// Optional explicit paths to the external tool binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub esbuild: Option<PathBuf>,
    pub npm: Option<PathBuf>,
    pub dotnet: Option<PathBuf>,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            tool_timeout_secs: 900,
            max_manifest_ascent: 3,
            diagnostics_cap_bytes: 64 * 1024,
            tool_paths: ToolPaths::default(),
        }
    }
}

impl BuilderSettings {
    /// Read settings from the given path, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Self::from_str(&content, &path.display().to_string())
    }

    /// Parse settings from TOML content.
    ///
    /// # Errors
    /// Returns an error if the content is not valid settings TOML.
    pub fn from_str(content: &str, origin: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|source| SettingsError::Parse {
            path: origin.to_owned(),
            source,
        })
    }

    /// The tool timeout as a [`std::time::Duration`].
    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Errors produced when loading builder settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file cannot be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// The settings file is not valid TOML.
    #[error("invalid settings at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}
