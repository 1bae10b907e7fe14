//! rrimage library exports.
//!
//! The binary is a thin CLI over these modules; integration tests drive
//! the build pipelines through [`process::ToolInvoker`] fakes.

pub mod artifact;
pub mod build;
pub mod commands;
pub mod compress;
pub mod config;
pub mod disk;
pub mod error;
pub mod layout;
pub mod preflight;
pub mod process;
pub mod timing;
