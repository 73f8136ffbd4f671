//! Error types for fnforge-engine.

/// Errors produced by the build pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No manifest matching the pattern was found within the search scope.
    #[error("no manifest matching `{pattern}` found under {search_root}")]
    ManifestNotFound {
        pattern: String,
        search_root: String,
    },

    /// The manifest exists but cannot be parsed.
    #[error("{0}")]
    Manifest(#[from] fnforge_config::ManifestError),

    /// A declared local dependency directory does not exist.
    #[error("local dependency `{name}` not found at {path}")]
    DependencyNotFound { name: String, path: String },

    /// Two declared names resolve to the same canonical local path.
    #[error(
        "dependencies `{first}` and `{second}` both resolve to {path} — \
         remove one of the conflicting declarations"
    )]
    AmbiguousDependency {
        first: String,
        second: String,
        path: String,
    },

    /// A local dependency transitively references its own canonical path.
    #[error("dependency cycle detected: {cycle}")]
    CyclicDependency { cycle: String },

    /// An extra include path lies outside both the source root and the
    /// manifest root.
    #[error(
        "include path {path} is outside both the source root and the manifest root — \
         move it into scope or pin the manifest root explicitly"
    )]
    IncludeOutsideScope { path: String },

    /// No workflow is registered for the (runtime, tool) pair.
    #[error("no build workflow supports runtime \"{runtime}\" with tool \"{tool}\"")]
    UnsupportedWorkflow { runtime: String, tool: String },

    /// A local dependency cannot be copied into the tool's staging
    /// directory.
    #[error("cannot stage local dependency `{name}` from {path}")]
    UnstageableDependency { name: String, path: String },

    /// The external tool binary could not be spawned.
    #[error("build tool `{tool}` is not available: {message}")]
    ToolUnavailable { tool: String, message: String },

    /// The external tool ran and exited non-zero.
    #[error("build tool `{tool}` failed with exit code {exit_code:?}")]
    BuildToolFailure {
        tool: String,
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// The external tool exceeded its wall-clock budget and was killed.
    #[error("build tool `{tool}` exceeded the {budget_secs}s budget and was terminated")]
    BuildTimeout {
        tool: String,
        budget_secs: u64,
        diagnostics: String,
    },

    /// The batch was canceled while this function's tool was running.
    #[error("build canceled")]
    Canceled,

    /// Artifact normalization failed; any previous artifact is untouched.
    #[error("cannot normalize build output: {message}")]
    Normalization { message: String },

    /// The worker thread pool could not be created.
    #[error("cannot create worker pool: {message}")]
    WorkerPool { message: String },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] fnforge_util::error::UtilError),

    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl EngineError {
    /// Captured external-tool diagnostics, when this error carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            EngineError::BuildToolFailure { diagnostics, .. }
            | EngineError::BuildTimeout { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}
