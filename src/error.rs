// src/error.rs

//! Crate-wide error types.
//!
//! Two layers: [`Error`] is the general crate error returned by constructors
//! and the filesystem/parsing primitives, while [`TaskError`] is the dedicated
//! kind raised by the build-requirement resolver and converted into
//! `ActionState::FailedTask` at the task boundary. `run()`/`undo()` never
//! return `Err`; failures inside a task surface as task states instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path violated a structural requirement (suffix, absoluteness, kind)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A package file or its metadata could not be parsed
    #[error("Package error: {0}")]
    Package(String),

    /// Malformed construction input (missing directory, missing required input)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Detached signature verification failed
    #[error("Signature verification failed: {0}")]
    Verification(String),

    /// Failure raised by the build-requirement resolver
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Errors raised while resolving build requirements against repository state.
///
/// Distinct from generic I/O errors: the owning task converts these to
/// `ActionState::FailedTask` without letting them propagate further.
#[derive(Error, Debug)]
pub enum TaskError {
    /// An archive entry matched a requirement but its filename is malformed
    #[error("Invalid package filename: {0}")]
    InvalidFileName(String),

    /// A management repository descriptor could not be read or parsed
    #[error("Failed reading descriptor {path}: {reason}")]
    Descriptor { path: PathBuf, reason: String },

    /// An archive subdirectory could not be traversed
    #[error("Failed reading archive directory {path}: {source}")]
    ArchiveDir { path: PathBuf, source: io::Error },
}
