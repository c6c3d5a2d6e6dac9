//! Error types for stagecache
//!
//! All modules use `CacheResult<T>` as their return type. Cache misses are
//! not errors: lookups report them through `LookupOutcome`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stagecache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in stagecache
#[derive(Error, Debug)]
pub enum CacheError {
    // Store errors
    #[error("Object store unavailable at {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("Object not found in store: {0}")]
    ObjectMissing(String),

    #[error("Corrupt object {id}: {reason}")]
    ObjectCorrupt { id: String, reason: String },

    #[error("Invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("Ref not found: {0}")]
    RefNotFound(String),

    #[error("Invalid ref name: {0}")]
    InvalidRef(String),

    #[error("Path is not valid UTF-8 and cannot be stored: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("A store transaction is already open")]
    TransactionActive,

    #[error("No store transaction is open")]
    NoTransaction,

    // Cache engine errors
    #[error("Failed to check out cache commit {commit}: {reason}")]
    Checkout { commit: String, reason: String },

    #[error("Failed to commit stage {stage} to cache: {reason}")]
    Commit { stage: String, reason: String },

    #[error("No stage selected; look up a stage before committing")]
    NoStage,

    #[error("No cache commit to compare against")]
    NoParent,

    #[error("Diff failed: {0}")]
    Diff(String),

    #[error("Garbage collection failed: {0}")]
    Gc(String),

    // Pipeline errors
    #[error("Invalid pipeline {path}: {reason}")]
    PipelineInvalid { path: PathBuf, reason: String },

    #[error("Pipeline file not found: {0}")]
    PipelineNotFound(PathBuf),

    #[error("Stage {stage} failed: `{command}` exited with code {code}")]
    StageFailed {
        stage: String,
        command: String,
        code: i32,
    },

    #[error("Stage {stage} terminated by signal")]
    StageSignaled { stage: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a checkout error for a commit
    pub fn checkout(commit: impl ToString, reason: impl ToString) -> Self {
        Self::Checkout {
            commit: commit.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error leaves the working directory in an unknown state.
    ///
    /// Callers must stop building when this returns true.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Checkout { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::StoreUnavailable { .. } => {
                Some("Check the cache directory, or remove it to start with an empty cache")
            }
            Self::Checkout { .. } => {
                Some("The working directory is in an unknown state; delete it and rebuild")
            }
            Self::TransactionActive => Some("Another commit is in progress on this store"),
            Self::PipelineNotFound(_) => Some("Pass --pipeline or create stagecache.toml"),
            Self::NoStage => Some("Call lookup for the stage before committing it"),
            Self::NonUtf8Path(_) => Some("Rename the file, or remove it before the stage ends"),
            _ => None,
        }
    }
}
