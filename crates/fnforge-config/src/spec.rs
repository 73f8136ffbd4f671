//! Function build specifications.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime family of a function. Closed set: adding a runtime means adding
/// a workflow for it, so unknown names are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// JavaScript/TypeScript functions packaged by a bundler.
    Nodejs,
    /// Managed .NET functions packaged by the publish toolchain.
    Dotnet,
}

impl Runtime {
    /// Default manifest filename pattern for this runtime, used when a spec
    /// does not declare one. The dotnet pattern is a glob because project
    /// files are named after the project.
    pub fn default_manifest_pattern(self) -> &'static str {
        match self {
            Runtime::Nodejs => "package.json",
            Runtime::Dotnet => "*.csproj",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Runtime::Nodejs => write!(f, "nodejs"),
            Runtime::Dotnet => write!(f, "dotnet"),
        }
    }
}

impl FromStr for Runtime {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nodejs" => Ok(Runtime::Nodejs),
            "dotnet" => Ok(Runtime::Dotnet),
            other => Err(SpecError::UnknownRuntime {
                name: other.to_owned(),
            }),
        }
    }
}

/// Declared build tool for a function. Closed set for the same reason as
/// [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildTool {
    /// The esbuild bundler.
    Esbuild,
    /// Plain npm dependency installation, no bundling.
    Npm,
    /// The `dotnet` CLI publish toolchain.
    DotnetCli,
}

impl std::fmt::Display for BuildTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildTool::Esbuild => write!(f, "esbuild"),
            BuildTool::Npm => write!(f, "npm"),
            BuildTool::DotnetCli => write!(f, "dotnet-cli"),
        }
    }
}

impl FromStr for BuildTool {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "esbuild" => Ok(BuildTool::Esbuild),
            "npm" => Ok(BuildTool::Npm),
            "dotnet-cli" => Ok(BuildTool::DotnetCli),
            other => Err(SpecError::UnknownTool {
                name: other.to_owned(),
            }),
        }
    }
}

/// One buildable unit, as produced by the external template/config reader.
///
/// Immutable once handed to the orchestrator; the engine borrows it for the
/// duration of a single build and retains nothing afterwards.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    /// Function identifier used to key build results.
    pub id: String,
    /// Directory containing the function's source code.
    pub source_root: PathBuf,
    /// Runtime family.
    pub runtime: Runtime,
    /// Declared build tool.
    pub tool: BuildTool,
    /// Manifest filename (or glob) override. When absent the runtime's
    /// default pattern is searched for.
    pub manifest_name: Option<String>,
    /// Pinned directory that must directly contain the manifest. Disables
    /// the ancestor search entirely.
    pub manifest_root: Option<PathBuf>,
    /// Entry point relative to the source root, for bundler runtimes.
    pub entry: Option<String>,
    /// Directories the caller knows must ship with the function, independent
    /// of manifest declarations.
    pub extra_include_paths: Vec<PathBuf>,
}

impl FunctionSpec {
    /// Create a spec with no overrides.
    pub fn new(
        id: impl Into<String>,
        source_root: impl Into<PathBuf>,
        runtime: Runtime,
        tool: BuildTool,
    ) -> Self {
        Self {
            id: id.into(),
            source_root: source_root.into(),
            runtime,
            tool,
            manifest_name: None,
            manifest_root: None,
            entry: None,
            extra_include_paths: Vec::new(),
        }
    }

    /// The manifest filename pattern to search for: the declared override,
    /// or the runtime default.
    pub fn manifest_pattern(&self) -> &str {
        self.manifest_name
            .as_deref()
            .unwrap_or_else(|| self.runtime.default_manifest_pattern())
    }
}

/// Errors produced when interpreting spec fields.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// The runtime name is not in the supported set.
    #[error("unknown runtime \"{name}\" — supported runtimes: nodejs, dotnet")]
    UnknownRuntime { name: String },

    /// The build tool name is not in the supported set.
    #[error("unknown build tool \"{name}\" — supported tools: esbuild, npm, dotnet-cli")]
    UnknownTool { name: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn runtime_from_str_roundtrip() {
        assert_eq!("nodejs".parse::<Runtime>().unwrap(), Runtime::Nodejs);
        assert_eq!("dotnet".parse::<Runtime>().unwrap(), Runtime::Dotnet);
    }

    #[test]
    fn runtime_unknown_rejected() {
        let err = "python".parse::<Runtime>().unwrap_err();
        assert!(err.to_string().contains("python"));
    }

    #[test]
    fn runtime_is_case_sensitive() {
        assert!("Nodejs".parse::<Runtime>().is_err());
        assert!("DOTNET".parse::<Runtime>().is_err());
    }

    #[test]
    fn tool_from_str() {
        assert_eq!("esbuild".parse::<BuildTool>().unwrap(), BuildTool::Esbuild);
        assert_eq!("npm".parse::<BuildTool>().unwrap(), BuildTool::Npm);
        assert_eq!(
            "dotnet-cli".parse::<BuildTool>().unwrap(),
            BuildTool::DotnetCli
        );
    }

    #[test]
    fn tool_unknown_names_offender() {
        let err = "webpack".parse::<BuildTool>().unwrap_err();
        assert!(err.to_string().contains("webpack"));
    }

    #[test]
    fn default_manifest_patterns() {
        assert_eq!(Runtime::Nodejs.default_manifest_pattern(), "package.json");
        assert_eq!(Runtime::Dotnet.default_manifest_pattern(), "*.csproj");
    }

    #[test]
    fn manifest_pattern_prefers_declared_name() {
        let mut spec = FunctionSpec::new("fn", "/tmp/fn", Runtime::Nodejs, BuildTool::Esbuild);
        assert_eq!(spec.manifest_pattern(), "package.json");

        spec.manifest_name = Some("manifest.json".to_owned());
        assert_eq!(spec.manifest_pattern(), "manifest.json");
    }
}
