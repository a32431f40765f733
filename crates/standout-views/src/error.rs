//! Error types for view resolution, compilation and rendering.
//!
//! [`ViewError`] is the single error type returned by every public operation
//! in this crate. Failures from the service container surface as
//! [`ViewError::Container`]; template execution failures from minijinja are
//! converted into [`ViewError::Render`] with the originating template and line.

use std::path::{Path, PathBuf};

use standout_container::ContainerError;
use thiserror::Error;

/// Error type for view operations.
#[derive(Debug, Error)]
pub enum ViewError {
    /// A service key was not bound, or a service failed to build.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// No source directory contains the named view.
    #[error("view [{name}] not found in {}", display_paths(searched))]
    ViewNotFound { name: String, searched: Vec<PathBuf> },

    /// Template or script code failed while executing.
    #[error("{}", render_message(path, *line, message))]
    Render {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    /// The global accessor was used before an instance was set.
    #[error("no views instance has been set; call facade::set_instance first")]
    Uninitialized,

    /// No rendering strategy is registered under this name.
    #[error("engine [{0}] not found")]
    UnknownEngine(String),

    /// A view name could not be parsed or its namespace is unknown.
    #[error("invalid view name [{name}]: {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid construction parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed directive or component syntax, before a path is known.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Malformed template source.
    #[error("failed to compile {}: {message}", path.display())]
    Compile { path: PathBuf, message: String },

    /// An event was queued but no queue capability was injected.
    #[error("event [{event}] is queued but no queue dispatcher is configured")]
    QueueUnavailable { event: String },

    /// The queue rejected an event.
    #[error("failed to queue event [{event}]: {message}")]
    Queue { event: String, message: String },
}

impl ViewError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ViewError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wraps a minijinja failure raised in the template file `origin`.
    pub(crate) fn render(origin: PathBuf, err: minijinja::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        ViewError::Render {
            path: origin,
            line: err.line(),
            message,
        }
    }
}

impl From<serde_yaml::Error> for ViewError {
    fn from(err: serde_yaml::Error) -> Self {
        ViewError::Config(err.to_string())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    format!("[{}]", joined.join(", "))
}

fn render_message(path: &Path, line: Option<usize>, message: &str) -> String {
    match line {
        Some(line) => format!("render error in {}:{}: {}", path.display(), line, message),
        None => format!("render error in {}: {}", path.display(), message),
    }
}
