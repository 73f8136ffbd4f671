#![forbid(unsafe_code)]
//! Filesystem utilities and scoped process execution for fnforge.

pub mod error;
pub mod fs;
pub mod process;

pub use error::UtilError;
