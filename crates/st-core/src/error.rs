//! Unified error type for segtrim.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for the CLI to derive a process exit code via [`Error::exit_code`].

use std::fmt;

/// Unified error type covering all failure modes in segtrim.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine never became ready.
    #[error("Engine load error: {0}")]
    EngineLoad(String),

    /// An engine operation was attempted outside the `Ready` state.
    #[error("Engine not ready (state: {state})")]
    EngineNotReady {
        /// Name of the state the engine was in.
        state: String,
    },

    /// A single engine command failed.
    #[error("Engine exec error [{command}]: {message}")]
    EngineExec {
        /// Short rendering of the command that failed.
        command: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A workspace operation (stage, materialize, purge) failed.
    #[error("Workspace error [{name}]: {message}")]
    Workspace {
        /// Virtual name involved in the operation.
        name: String,
        /// Human-readable error description.
        message: String,
    },

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "virtual file", "segment").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A run is already in progress.
    #[error("Busy: {0}")]
    Busy(String),

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An output sink refused or failed to store a segment.
    #[error("Sink error [{name}]: {message}")]
    Sink {
        /// Suggested file name of the output being delivered.
        name: String,
        /// Human-readable error description.
        message: String,
    },

    /// Configuration could not be parsed or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to a process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) | Error::Config(_) => 2,
            Error::EngineLoad(_) | Error::EngineNotReady { .. } => 3,
            Error::EngineExec { .. } | Error::Tool { .. } => 4,
            Error::Io { .. } | Error::Workspace { .. } | Error::NotFound { .. } => 5,
            Error::Sink { .. } => 6,
            Error::Busy(_) => 7,
            Error::Internal(_) => 1,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::EngineExec`].
    pub fn exec(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::EngineExec {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Workspace`].
    pub fn workspace(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Workspace {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Sink`].
    pub fn sink(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Sink {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error means a virtual file or entity was absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
