//! Artifact normalization.
//!
//! Tool output lands in a scratch staging directory; normalization rewrites
//! it into the canonical artifact layout for the workflow and swaps the
//! result into the final artifact directory in one step. A failure anywhere
//! leaves a previous artifact at that path untouched.

use std::path::Path;

use fnforge_util::fs;

use crate::closure::DependencyClosure;
use crate::error::EngineError;
use crate::workflow::BuildWorkflow;

/// Normalize `tool_output` into `artifact_dir` for the given workflow.
///
/// Bundled output is flattened into the artifact root; install and publish
/// output keeps its internal structure. Workflows that ship the local
/// dependency closure get each closure directory copied under the artifact
/// root by its directory name.
///
/// `staging` is the caller's scratch directory for assembling the layout;
/// it must live outside the artifact tree so no function id can collide
/// with it. It is recreated fresh here and consumed by the final swap.
///
/// # Errors
/// Returns [`EngineError::Normalization`] for a closure path with no usable
/// directory name, or a wrapped I/O error from copying or the final swap.
pub fn normalize(
    workflow: BuildWorkflow,
    tool_output: &Path,
    closure: &DependencyClosure,
    artifact_dir: &Path,
    staging: &Path,
) -> Result<(), EngineError> {
    fs::remove_dir_all_if_exists(staging)?;
    fs::ensure_dir(staging)?;

    let result = populate(workflow, tool_output, closure, staging)
        .and_then(|()| fs::replace_dir(staging, artifact_dir).map_err(EngineError::from));

    if result.is_err() {
        // The half-built staging dir is scratch; the artifact dir was never
        // touched.
        let _ = fs::remove_dir_all_if_exists(staging);
    }
    result
}

fn populate(
    workflow: BuildWorkflow,
    tool_output: &Path,
    closure: &DependencyClosure,
    staging: &Path,
) -> Result<(), EngineError> {
    if workflow.flattens_output() {
        fs::flatten_files(tool_output, staging)?;
    } else {
        fs::copy_dir_recursive(tool_output, staging)?;
    }

    if workflow.ships_closure() {
        for local in &closure.local_paths {
            let name = local
                .file_name()
                .ok_or_else(|| EngineError::Normalization {
                    message: format!(
                        "closure path {} has no directory name",
                        local.display()
                    ),
                })?;
            fs::copy_dir_recursive(local, &staging.join(name))?;
        }
    }

    Ok(())
}
