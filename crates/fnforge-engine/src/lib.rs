//! Build pipeline for packaging serverless functions.
//!
//! The engine turns a batch of [`FunctionSpec`]s into normalized artifact
//! directories: it locates each function's manifest, assembles the local
//! dependency closure, selects the workflow for the (runtime, tool) pair,
//! runs the external build tool under a wall-clock budget, and swaps the
//! normalized output into place.
//!
//! [`FunctionSpec`]: fnforge_config::FunctionSpec

pub mod closure;
pub mod error;
pub mod execute;
pub mod locate;
pub mod normalize;
pub mod orchestrate;
pub mod workflow;

pub use closure::{DependencyClosure, ExternalPackage};
pub use error::EngineError;
pub use locate::ManifestLocation;
pub use orchestrate::{build_all, BuildFailure, BuildResult, Stage};
pub use workflow::{select, BuildWorkflow, InvocationPlan, ManifestPatch};
