//! Error types for fnforge-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A path has no final component to derive a sibling name from.
    #[error("path {path} has no directory name")]
    InvalidPath { path: String },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// A command could not be spawned at all (distinct from a non-zero exit).
    #[error("cannot execute `{program}`: {source}")]
    CommandSpawn {
        program: String,
        source: std::io::Error,
    },

    /// A spawned child's output streams could not be captured.
    #[error("cannot capture output of `{program}`")]
    CommandPipes { program: String },
}
