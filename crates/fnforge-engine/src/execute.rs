//! External tool execution.
//!
//! Runs one [`InvocationPlan`] under a wall-clock budget and a shared
//! cancellation flag, mapping every non-success outcome to a typed error
//! carrying the tool's captured diagnostics.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use fnforge_config::ManifestError;
use fnforge_util::process::{run_scoped, RunStatus};
use fnforge_util::{fs, UtilError};

use crate::error::EngineError;
use crate::workflow::InvocationPlan;

/// Execute one tool invocation to completion.
///
/// When the plan declares a `stage_from` directory, its contents are copied
/// into the output directory first so tools that build in place see their
/// sources there. The output directory is created if absent.
///
/// # Errors
/// - [`EngineError::ToolUnavailable`] when the binary cannot be found.
/// - [`EngineError::BuildToolFailure`] on a non-zero exit.
/// - [`EngineError::BuildTimeout`] when the budget elapses.
/// - [`EngineError::Canceled`] when the cancellation flag is raised.
pub fn execute(
    plan: &InvocationPlan,
    budget: Duration,
    cancel: &AtomicBool,
    capture_cap: usize,
) -> Result<(), EngineError> {
    fs::ensure_dir(&plan.output_dir)?;
    if let Some(stage_from) = &plan.stage_from {
        fs::copy_dir_recursive(stage_from, &plan.output_dir)?;
    }
    for dep in &plan.stage_deps {
        if let Some(name) = dep.file_name() {
            fs::copy_dir_recursive(dep, &plan.output_dir.join(name))?;
        }
    }
    if let Some(patch) = &plan.manifest_patch {
        apply_manifest_patch(
            &plan.output_dir.join(&patch.file_name),
            &patch.entries,
        )?;
    }

    let mut cmd = Command::new(&plan.program);
    cmd.args(&plan.args).current_dir(&plan.cwd);
    for (key, value) in &plan.env {
        cmd.env(key, value);
    }

    let outcome = match run_scoped(&mut cmd, budget, cancel, capture_cap) {
        Ok(outcome) => outcome,
        Err(UtilError::CommandSpawn { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            return Err(EngineError::ToolUnavailable {
                tool: plan.tool.to_owned(),
                message: format!("{} not found on PATH", plan.program.display()),
            });
        }
        Err(source) => return Err(EngineError::Util(source)),
    };

    match outcome.status {
        RunStatus::Completed { success: true, .. } => Ok(()),
        RunStatus::Completed { exit_code, .. } => Err(EngineError::BuildToolFailure {
            tool: plan.tool.to_owned(),
            exit_code,
            diagnostics: outcome.diagnostics,
        }),
        RunStatus::TimedOut => Err(EngineError::BuildTimeout {
            tool: plan.tool.to_owned(),
            budget_secs: budget.as_secs(),
            diagnostics: outcome.diagnostics,
        }),
        RunStatus::Canceled => Err(EngineError::Canceled),
    }
}

/// Re-point dependency requirements in the staged manifest at their staged
/// copies. Only entries the plan names are touched; everything else in the
/// file is preserved.
fn apply_manifest_patch(path: &Path, entries: &[(String, String)]) -> Result<(), EngineError> {
    let io_err = |source: std::io::Error| EngineError::Io {
        path: path.display().to_string(),
        source,
    };
    let parse_err = |source: serde_json::Error| {
        EngineError::Manifest(ManifestError::Parse {
            path: path.display().to_string(),
            source,
        })
    };

    let content = std::fs::read_to_string(path).map_err(io_err)?;
    let mut doc: serde_json::Value = serde_json::from_str(&content).map_err(parse_err)?;

    if let Some(deps) = doc.get_mut("dependencies").and_then(|d| d.as_object_mut()) {
        for (name, requirement) in entries {
            if let Some(slot) = deps.get_mut(name) {
                *slot = serde_json::Value::String(requirement.clone());
            }
        }
    }

    let rewritten = serde_json::to_string_pretty(&doc).map_err(parse_err)?;
    std::fs::write(path, rewritten).map_err(io_err)
}
