//! Function specs, builder settings, and dependency manifest parsing.

pub mod manifest;
pub mod settings;
pub mod spec;

pub use manifest::{DependencyEntry, DependencySource, ManifestError};
pub use settings::BuilderSettings;
pub use spec::{BuildTool, FunctionSpec, Runtime};
