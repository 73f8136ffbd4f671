//! Workflow selection and tool invocation planning.
//!
//! The (runtime, tool) table is closed and checked exhaustively: an unknown
//! pair is rejected up front rather than falling back to a default, since a
//! fallback would build the artifact with the wrong toolchain.

use std::path::{Path, PathBuf};

use fnforge_config::manifest::{parse_manifest, DependencySource};
use fnforge_config::settings::ToolPaths;
use fnforge_config::{BuildTool, FunctionSpec, Runtime};

use crate::closure::DependencyClosure;
use crate::error::EngineError;
use crate::locate::ManifestLocation;

/// Default entry point for bundler runtimes when the spec declares none.
const DEFAULT_NODE_ENTRY: &str = "index.js";

/// A build strategy bound to exactly one (runtime, tool) pair. Stateless:
/// it only translates a spec, manifest location, and closure into an
/// invocation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildWorkflow {
    /// Bundle JavaScript/TypeScript with esbuild.
    EsbuildBundle,
    /// Install npm dependencies without bundling.
    NpmInstall,
    /// Publish a managed .NET project with the dotnet CLI.
    DotnetPublish,
}

impl BuildWorkflow {
    /// The external tool binary name, used for `PATH` resolution and error
    /// messages.
    pub fn tool_name(self) -> &'static str {
        match self {
            BuildWorkflow::EsbuildBundle => "esbuild",
            BuildWorkflow::NpmInstall => "npm",
            BuildWorkflow::DotnetPublish => "dotnet",
        }
    }

    /// Whether the tool's output is a flat bundle (vs. a structured publish
    /// directory that must be preserved verbatim).
    pub fn flattens_output(self) -> bool {
        matches!(self, BuildWorkflow::EsbuildBundle)
    }

    /// Whether the local dependency closure must be copied into the artifact
    /// by the normalizer (bundler-family runtimes) or is already compiled in
    /// by the tool (managed publish).
    pub fn ships_closure(self) -> bool {
        matches!(
            self,
            BuildWorkflow::EsbuildBundle | BuildWorkflow::NpmInstall
        )
    }

    /// Build the tool invocation plan for one function.
    ///
    /// # Errors
    /// Returns an error when a local dependency that must be staged for the
    /// tool cannot be resolved or has no usable directory name.
    pub fn plan(
        self,
        spec: &FunctionSpec,
        location: &ManifestLocation,
        closure: &DependencyClosure,
        staging_dir: &Path,
        tool_paths: &ToolPaths,
    ) -> Result<InvocationPlan, EngineError> {
        match self {
            BuildWorkflow::EsbuildBundle => {
                let entry = spec
                    .source_root
                    .join(spec.entry.as_deref().unwrap_or(DEFAULT_NODE_ENTRY));

                let mut env = Vec::new();
                if !closure.local_paths.is_empty() {
                    // Local modules live outside the tool's working
                    // directory; NODE_PATH lets the bundler resolve them.
                    let node_path = closure
                        .local_paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(":");
                    env.push(("NODE_PATH".to_owned(), node_path));
                }

                Ok(InvocationPlan {
                    tool: self.tool_name(),
                    program: resolve_program(tool_paths.esbuild.as_deref(), self.tool_name()),
                    args: vec![
                        entry.display().to_string(),
                        "--bundle".to_owned(),
                        "--platform=node".to_owned(),
                        format!("--outdir={}", staging_dir.display()),
                    ],
                    cwd: location.manifest_root.clone(),
                    env,
                    stage_from: None,
                    stage_deps: Vec::new(),
                    manifest_patch: None,
                    output_dir: staging_dir.to_path_buf(),
                })
            }
            BuildWorkflow::NpmInstall => {
                let (stage_deps, manifest_patch) = npm_local_rewrites(location)?;
                Ok(InvocationPlan {
                    tool: self.tool_name(),
                    program: resolve_program(tool_paths.npm.as_deref(), self.tool_name()),
                    args: vec!["install".to_owned(), "--production".to_owned()],
                    // npm installs into its working directory, so the
                    // manifest root is first copied to staging and npm runs
                    // there. Local dependencies outside the manifest root
                    // are staged alongside it and the staged manifest is
                    // re-pointed at those copies.
                    cwd: staging_dir.to_path_buf(),
                    env: Vec::new(),
                    stage_from: Some(location.manifest_root.clone()),
                    stage_deps,
                    manifest_patch,
                    output_dir: staging_dir.to_path_buf(),
                })
            }
            BuildWorkflow::DotnetPublish => Ok(InvocationPlan {
                tool: self.tool_name(),
                program: resolve_program(tool_paths.dotnet.as_deref(), self.tool_name()),
                args: vec![
                    "publish".to_owned(),
                    location.manifest_path.display().to_string(),
                    "--nologo".to_owned(),
                    "-c".to_owned(),
                    "Release".to_owned(),
                    "-o".to_owned(),
                    staging_dir.display().to_string(),
                ],
                cwd: location.manifest_root.clone(),
                env: Vec::new(),
                stage_from: None,
                stage_deps: Vec::new(),
                manifest_patch: None,
                output_dir: staging_dir.to_path_buf(),
            }),
        }
    }
}

/// Find local dependencies declared outside the manifest root. Each must be
/// copied into the npm staging directory and its requirement re-pointed at
/// the staged copy, since the relative path dangles once the manifest root
/// is copied elsewhere.
fn npm_local_rewrites(
    location: &ManifestLocation,
) -> Result<(Vec<PathBuf>, Option<ManifestPatch>), EngineError> {
    let root = location
        .manifest_root
        .canonicalize()
        .unwrap_or_else(|_| location.manifest_root.clone());

    let mut stage_deps = Vec::new();
    let mut entries = Vec::new();

    for dep in parse_manifest(&location.manifest_path, Runtime::Nodejs)? {
        let DependencySource::Local { relative_path } = dep.source else {
            continue;
        };
        let resolved = location.manifest_root.join(&relative_path);
        let canonical = resolved
            .canonicalize()
            .map_err(|_| EngineError::DependencyNotFound {
                name: dep.name.clone(),
                path: resolved.display().to_string(),
            })?;
        if canonical.starts_with(&root) {
            // Copied along with the manifest root; the relative path keeps
            // working in staging.
            continue;
        }

        let Some(dir_name) = canonical.file_name().and_then(|n| n.to_str()) else {
            return Err(EngineError::UnstageableDependency {
                name: dep.name,
                path: canonical.display().to_string(),
            });
        };
        entries.push((dep.name, format!("file:./{dir_name}")));
        stage_deps.push(canonical);
    }

    let patch = (!entries.is_empty()).then(|| ManifestPatch {
        file_name: location
            .manifest_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("package.json")
            .to_owned(),
        entries,
    });
    Ok((stage_deps, patch))
}

fn resolve_program(override_path: Option<&Path>, name: &str) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Everything the executor needs to run one external tool invocation.
#[derive(Debug, Clone)]
pub struct InvocationPlan {
    /// Tool name for error reporting.
    pub tool: &'static str,
    /// Binary to spawn (override path or bare name for `PATH` lookup).
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory for the tool.
    pub cwd: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Directory whose contents must be copied into `output_dir` before the
    /// tool runs (tools that build in place).
    pub stage_from: Option<PathBuf>,
    /// Local dependency directories copied into `output_dir` by directory
    /// name before the tool runs.
    pub stage_deps: Vec<PathBuf>,
    /// Requirement rewrites to apply to the staged manifest so it resolves
    /// against the staged dependency copies.
    pub manifest_patch: Option<ManifestPatch>,
    /// Where the tool leaves its output.
    pub output_dir: PathBuf,
}

/// Dependency requirement rewrites for a staged manifest.
#[derive(Debug, Clone)]
pub struct ManifestPatch {
    /// Manifest filename inside the staging directory.
    pub file_name: String,
    /// Dependency name to replacement requirement string.
    pub entries: Vec<(String, String)>,
}

/// Map a (runtime, tool) pair to its workflow.
///
/// # Errors
/// Returns [`EngineError::UnsupportedWorkflow`] naming both inputs for any
/// pair outside the closed table.
pub fn select(runtime: Runtime, tool: BuildTool) -> Result<BuildWorkflow, EngineError> {
    match (runtime, tool) {
        (Runtime::Nodejs, BuildTool::Esbuild) => Ok(BuildWorkflow::EsbuildBundle),
        (Runtime::Nodejs, BuildTool::Npm) => Ok(BuildWorkflow::NpmInstall),
        (Runtime::Dotnet, BuildTool::DotnetCli) => Ok(BuildWorkflow::DotnetPublish),
        (runtime, tool) => Err(EngineError::UnsupportedWorkflow {
            runtime: runtime.to_string(),
            tool: tool.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    use super::*;

    fn node_spec() -> FunctionSpec {
        FunctionSpec::new("fn-a", "/proj/fnA", Runtime::Nodejs, BuildTool::Esbuild)
    }

    fn node_location() -> ManifestLocation {
        ManifestLocation {
            manifest_path: PathBuf::from("/proj/shared/package.json"),
            manifest_root: PathBuf::from("/proj/shared"),
        }
    }

    #[test]
    fn select_known_pairs() {
        assert_eq!(
            select(Runtime::Nodejs, BuildTool::Esbuild).unwrap(),
            BuildWorkflow::EsbuildBundle
        );
        assert_eq!(
            select(Runtime::Nodejs, BuildTool::Npm).unwrap(),
            BuildWorkflow::NpmInstall
        );
        assert_eq!(
            select(Runtime::Dotnet, BuildTool::DotnetCli).unwrap(),
            BuildWorkflow::DotnetPublish
        );
    }

    #[test]
    fn select_unknown_pair_names_both() {
        let err = select(Runtime::Dotnet, BuildTool::Esbuild).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dotnet"), "message was: {msg}");
        assert!(msg.contains("esbuild"), "message was: {msg}");
    }

    #[test]
    fn select_never_defaults() {
        assert!(select(Runtime::Dotnet, BuildTool::Npm).is_err());
        assert!(select(Runtime::Nodejs, BuildTool::DotnetCli).is_err());
    }

    #[test]
    fn esbuild_plan_args() {
        let closure = DependencyClosure::default();
        let plan = BuildWorkflow::EsbuildBundle
            .plan(
                &node_spec(),
                &node_location(),
                &closure,
                Path::new("/scratch/fn-a"),
                &ToolPaths::default(),
            )
            .unwrap();

        assert_eq!(plan.program, PathBuf::from("esbuild"));
        assert_eq!(plan.cwd, PathBuf::from("/proj/shared"));
        assert_eq!(
            plan.args,
            vec![
                "/proj/fnA/index.js",
                "--bundle",
                "--platform=node",
                "--outdir=/scratch/fn-a",
            ]
        );
        assert!(plan.env.is_empty());
        assert!(plan.stage_from.is_none());
    }

    #[test]
    fn esbuild_plan_custom_entry() {
        let mut spec = node_spec();
        spec.entry = Some("src/handler.ts".to_owned());

        let plan = BuildWorkflow::EsbuildBundle
            .plan(
                &spec,
                &node_location(),
                &DependencyClosure::default(),
                Path::new("/scratch/fn-a"),
                &ToolPaths::default(),
            )
            .unwrap();
        assert_eq!(
            plan.args.first().unwrap(),
            "/proj/fnA/src/handler.ts"
        );
    }

    #[test]
    fn esbuild_plan_exposes_closure_via_node_path() {
        let mut local_paths = BTreeSet::new();
        local_paths.insert(PathBuf::from("/proj/shared/libutil"));
        local_paths.insert(PathBuf::from("/proj/shared/libfmt"));
        let closure = DependencyClosure {
            local_paths,
            external: Vec::new(),
        };

        let plan = BuildWorkflow::EsbuildBundle
            .plan(
                &node_spec(),
                &node_location(),
                &closure,
                Path::new("/scratch/fn-a"),
                &ToolPaths::default(),
            )
            .unwrap();

        let (key, value) = plan.env.first().unwrap();
        assert_eq!(key, "NODE_PATH");
        assert!(value.contains("/proj/shared/libutil"));
        assert!(value.contains("/proj/shared/libfmt"));
    }

    #[test]
    fn npm_plan_stages_manifest_root() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("package.json"), "{}").unwrap();

        let spec = FunctionSpec::new("fn-a", "/proj/fnA", Runtime::Nodejs, BuildTool::Npm);
        let location = ManifestLocation {
            manifest_path: shared.join("package.json"),
            manifest_root: shared.clone(),
        };

        let plan = BuildWorkflow::NpmInstall
            .plan(
                &spec,
                &location,
                &DependencyClosure::default(),
                Path::new("/scratch/fn-a"),
                &ToolPaths::default(),
            )
            .unwrap();

        assert_eq!(plan.args, vec!["install", "--production"]);
        assert_eq!(plan.stage_from, Some(shared));
        assert_eq!(plan.cwd, PathBuf::from("/scratch/fn-a"));
        assert!(plan.stage_deps.is_empty());
        assert!(plan.manifest_patch.is_none());
    }

    #[test]
    fn npm_plan_in_root_local_dep_needs_no_rewrite() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        std::fs::create_dir_all(shared.join("libutil")).unwrap();
        std::fs::write(
            shared.join("package.json"),
            r#"{"dependencies": {"libutil": "file:./libutil"}}"#,
        )
        .unwrap();

        let spec = FunctionSpec::new("fn-a", "/proj/fnA", Runtime::Nodejs, BuildTool::Npm);
        let location = ManifestLocation {
            manifest_path: shared.join("package.json"),
            manifest_root: shared,
        };

        let plan = BuildWorkflow::NpmInstall
            .plan(
                &spec,
                &location,
                &DependencyClosure::default(),
                Path::new("/scratch/fn-a"),
                &ToolPaths::default(),
            )
            .unwrap();

        // Copied with the manifest root; the relative path stays valid.
        assert!(plan.stage_deps.is_empty());
        assert!(plan.manifest_patch.is_none());
    }

    #[test]
    fn npm_plan_stages_out_of_root_local_dep() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        let libutil = tmp.path().join("libutil");
        std::fs::create_dir_all(&libutil).unwrap();
        std::fs::write(
            shared.join("package.json"),
            r#"{"dependencies": {"libutil": "file:../libutil", "lodash": "^4.0.0"}}"#,
        )
        .unwrap();

        let spec = FunctionSpec::new("fn-a", "/proj/fnA", Runtime::Nodejs, BuildTool::Npm);
        let location = ManifestLocation {
            manifest_path: shared.join("package.json"),
            manifest_root: shared,
        };

        let plan = BuildWorkflow::NpmInstall
            .plan(
                &spec,
                &location,
                &DependencyClosure::default(),
                Path::new("/scratch/fn-a"),
                &ToolPaths::default(),
            )
            .unwrap();

        assert_eq!(plan.stage_deps, vec![libutil.canonicalize().unwrap()]);
        let patch = plan.manifest_patch.unwrap();
        assert_eq!(patch.file_name, "package.json");
        assert_eq!(
            patch.entries,
            vec![("libutil".to_owned(), "file:./libutil".to_owned())]
        );
    }

    #[test]
    fn dotnet_plan_publishes_manifest() {
        let spec = FunctionSpec::new(
            "order-fn",
            "/proj/OrderFn",
            Runtime::Dotnet,
            BuildTool::DotnetCli,
        );
        let location = ManifestLocation {
            manifest_path: PathBuf::from("/proj/OrderFn/OrderFn.csproj"),
            manifest_root: PathBuf::from("/proj/OrderFn"),
        };

        let plan = BuildWorkflow::DotnetPublish
            .plan(
                &spec,
                &location,
                &DependencyClosure::default(),
                Path::new("/scratch/order-fn"),
                &ToolPaths::default(),
            )
            .unwrap();

        assert_eq!(plan.program, PathBuf::from("dotnet"));
        assert_eq!(plan.args.first().unwrap(), "publish");
        assert!(plan
            .args
            .iter()
            .any(|a| a == "/proj/OrderFn/OrderFn.csproj"));
        assert!(plan.args.iter().any(|a| a == "/scratch/order-fn"));
        assert_eq!(plan.cwd, PathBuf::from("/proj/OrderFn"));
    }

    #[test]
    fn tool_path_override_wins() {
        let tool_paths = ToolPaths {
            esbuild: Some(PathBuf::from("/opt/esbuild")),
            ..ToolPaths::default()
        };

        let plan = BuildWorkflow::EsbuildBundle
            .plan(
                &node_spec(),
                &node_location(),
                &DependencyClosure::default(),
                Path::new("/scratch/fn-a"),
                &tool_paths,
            )
            .unwrap();
        assert_eq!(plan.program, PathBuf::from("/opt/esbuild"));
    }

    #[test]
    fn normalization_traits_per_workflow() {
        assert!(BuildWorkflow::EsbuildBundle.flattens_output());
        assert!(!BuildWorkflow::NpmInstall.flattens_output());
        assert!(!BuildWorkflow::DotnetPublish.flattens_output());

        assert!(BuildWorkflow::EsbuildBundle.ships_closure());
        assert!(BuildWorkflow::NpmInstall.ships_closure());
        assert!(!BuildWorkflow::DotnetPublish.ships_closure());
    }
}
