//! Error kinds raised by the image build pipeline.
//!
//! Every error is fatal at the point of detection. The CLI prints the
//! message prefixed with `Error: ` and exits with status 1.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A required host executable is not in PATH.
    #[error("required tool '{tool}' not found in PATH (install: {package})")]
    MissingTool { tool: String, package: String },

    /// A required input file does not exist.
    #[error("{what} not found at '{}'", path.display())]
    MissingArtifact { what: String, path: PathBuf },

    /// A user-supplied value was rejected.
    #[error("{0}")]
    Validation(String),

    /// A subprocess exited non-zero.
    #[error("command failed: {command} (exit {code}){}", format_output(output))]
    ExternalCommand {
        command: String,
        code: i32,
        output: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn missing_artifact(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short kind name, used in stage failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTool { .. } => "MissingTool",
            Self::MissingArtifact { .. } => "MissingArtifact",
            Self::Validation(_) => "Validation",
            Self::ExternalCommand { .. } => "ExternalCommand",
            Self::Io { .. } => "Io",
        }
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}

/// Attach a context string to a raw `io::Result`.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| BuildError::io(f(), e))
    }
}
