//! Error types for tool execution.

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use crate::protocol::{INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, SERVER_ERROR};

/// Failures surfaced to the client as JSON-RPC error responses.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Method not found: {name}")]
    UnknownTool { name: String },

    /// Arguments could not be decoded or failed validation.
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// `work_dir` could not be resolved.
    #[error("Invalid work_dir: {path}: {source}")]
    InvalidWorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `work_dir` exists but is not a directory.
    #[error("work_dir is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Requested text encoding is not supported.
    #[error(
        "unsupported encoding: {name}. Supported encodings: utf-8, utf-16, utf-16be, \
         utf-16le, windows-1251, iso-8859-1, iso-8859-15, windows-1252"
    )]
    UnsupportedEncoding { name: String },

    /// `pattern` is not a valid regular expression.
    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// `pattern` is not a valid glob.
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// I/O error with context.
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file on disk does not have the size that was written.
    #[error("File size mismatch for {path}: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// The shell could not be started.
    #[error("Failed to start command: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the command failed after its deadline had passed.
    #[error("Command timed out after {seconds} seconds")]
    TimedOut { seconds: u64 },

    /// Waiting on the command failed for any other reason.
    #[error("Command execution error: {source}")]
    Execution {
        #[source]
        source: std::io::Error,
    },

    /// The server is shutting down and refuses to start new commands.
    #[error("server is shutting down, command was not run")]
    ShuttingDown,

    /// A tool result could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem work on the blocking pool panicked or was cancelled.
    #[error("background task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl ToolError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// JSON-RPC error code for this failure.
    pub const fn code(&self) -> i64 {
        match self {
            Self::UnknownTool { .. } => METHOD_NOT_FOUND,
            Self::InvalidArguments { .. }
            | Self::InvalidWorkDir { .. }
            | Self::NotADirectory { .. }
            | Self::UnsupportedEncoding { .. }
            | Self::InvalidPattern { .. }
            | Self::InvalidGlob { .. } => INVALID_PARAMS,
            Self::Io { .. }
            | Self::SizeMismatch { .. }
            | Self::SpawnFailed { .. }
            | Self::TimedOut { .. }
            | Self::Execution { .. }
            | Self::ShuttingDown => SERVER_ERROR,
            Self::Json(_) | Self::Blocking(_) => INTERNAL_ERROR,
        }
    }

    /// Structured context attached to the error response next to the
    /// received arguments. `None` means the response carries no `data`.
    pub fn context(&self) -> Option<Map<String, Value>> {
        let mut data = Map::new();
        match self {
            Self::UnknownTool { .. } => return None,
            Self::TimedOut { seconds } => {
                data.insert("timeout".to_owned(), json!(seconds));
            }
            Self::SizeMismatch {
                expected, actual, ..
            } => {
                data.insert("expected_size".to_owned(), json!(expected));
                data.insert("actual_size".to_owned(), json!(actual));
            }
            Self::SpawnFailed { command, .. } => {
                data.insert("command".to_owned(), json!(command));
            }
            _ => {}
        }
        Some(data)
    }
}

/// Convenience result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
