//! Batch build orchestration.
//!
//! Each function runs the same sequential pipeline: locate the manifest,
//! build the dependency closure, select the workflow, run the tool, and
//! normalize the output. Functions in a batch run in parallel on a bounded
//! worker pool, and one function's failure never aborts the others.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use fnforge_config::{BuilderSettings, FunctionSpec};

use crate::closure::build_closure;
use crate::error::EngineError;
use crate::execute::execute;
use crate::locate::locate;
use crate::normalize::normalize;
use crate::workflow::select;

/// Pipeline stage at which a build failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locate,
    Closure,
    Select,
    Execute,
    Normalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Locate => "manifest location",
            Stage::Closure => "dependency resolution",
            Stage::Select => "workflow selection",
            Stage::Execute => "tool execution",
            Stage::Normalize => "artifact normalization",
        };
        f.write_str(name)
    }
}

/// A build error tagged with the stage that produced it.
#[derive(Debug)]
pub struct BuildFailure {
    pub stage: Stage,
    pub error: EngineError,
}

impl BuildFailure {
    /// Captured tool diagnostics, when the underlying error carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        self.error.diagnostics()
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed during {}: {}", self.stage, self.error)
    }
}

/// Terminal record for one function's build.
#[derive(Debug)]
pub struct BuildResult {
    pub function_id: String,
    pub elapsed: Duration,
    /// The normalized artifact directory, or the stage-tagged failure.
    pub outcome: Result<PathBuf, BuildFailure>,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Build every function in the batch, in parallel, collecting one result per
/// function keyed and ordered by function id.
///
/// Artifacts land at `<artifact_root>/<function id>`; scratch directories
/// live under `<artifact_root>/.scratch` and are removed per function on
/// completion. Raising `cancel` stops in-flight tool invocations; functions
/// already normalized keep their artifacts.
///
/// # Errors
/// Returns an error only when the worker pool itself cannot be created.
/// Per-function failures are reported inside the result map.
pub fn build_all(
    specs: &[FunctionSpec],
    settings: &BuilderSettings,
    artifact_root: &Path,
    cancel: &AtomicBool,
) -> Result<BTreeMap<String, BuildResult>, EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers.max(1))
        .build()
        .map_err(|e| EngineError::WorkerPool {
            message: e.to_string(),
        })?;

    let results: Vec<BuildResult> = pool.install(|| {
        specs
            .par_iter()
            .map(|spec| {
                eprintln!(
                    "    Building {} ({}/{})",
                    spec.id, spec.runtime, spec.tool
                );
                let start = Instant::now();
                let outcome = build_one(spec, settings, artifact_root, cancel);
                match &outcome {
                    Ok(path) => {
                        eprintln!("    Built {} \u{2192} {}", spec.id, path.display());
                    }
                    Err(failure) => eprintln!("    error: {}: {failure}", spec.id),
                }
                BuildResult {
                    function_id: spec.id.clone(),
                    elapsed: start.elapsed(),
                    outcome,
                }
            })
            .collect()
    });

    Ok(results
        .into_iter()
        .map(|r| (r.function_id.clone(), r))
        .collect())
}

/// Run the five-stage pipeline for one function.
fn build_one(
    spec: &FunctionSpec,
    settings: &BuilderSettings,
    artifact_root: &Path,
    cancel: &AtomicBool,
) -> Result<PathBuf, BuildFailure> {
    let artifact_dir = artifact_root.join(&spec.id);
    let scratch = artifact_root.join(".scratch").join(&spec.id);

    let result = run_pipeline(spec, settings, &artifact_dir, &scratch, cancel);
    let _ = fnforge_util::fs::remove_dir_all_if_exists(&scratch);
    result
}

fn run_pipeline(
    spec: &FunctionSpec,
    settings: &BuilderSettings,
    artifact_dir: &Path,
    scratch: &Path,
    cancel: &AtomicBool,
) -> Result<PathBuf, BuildFailure> {
    let at = |stage: Stage| move |error: EngineError| BuildFailure { stage, error };

    let location = locate(
        &spec.source_root,
        spec.manifest_pattern(),
        spec.manifest_root.as_deref(),
        settings.max_manifest_ascent,
    )
    .map_err(at(Stage::Locate))?;

    let closure = build_closure(
        &location,
        spec.runtime,
        &spec.extra_include_paths,
        &spec.source_root,
    )
    .map_err(at(Stage::Closure))?;

    let workflow = select(spec.runtime, spec.tool).map_err(at(Stage::Select))?;

    // Stale scratch from an interrupted run must not leak into this build.
    // Tool output and the normalization staging area both live under the
    // per-function scratch directory, never next to the artifacts.
    fnforge_util::fs::remove_dir_all_if_exists(scratch)
        .map_err(|e| at(Stage::Execute)(e.into()))?;
    let plan = workflow
        .plan(
            spec,
            &location,
            &closure,
            &scratch.join("out"),
            &settings.tool_paths,
        )
        .map_err(at(Stage::Execute))?;
    execute(
        &plan,
        settings.tool_timeout(),
        cancel,
        settings.diagnostics_cap_bytes,
    )
    .map_err(at(Stage::Execute))?;

    normalize(
        workflow,
        &plan.output_dir,
        &closure,
        artifact_dir,
        &scratch.join("norm"),
    )
    .map_err(at(Stage::Normalize))?;

    Ok(artifact_dir.to_path_buf())
}
