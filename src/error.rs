/// Error types shared by the calibration and capture modules
///
/// Preconditions (bad state, bad input) and format failures (files and
/// records that cannot be read) are kept in separate variants so callers
/// can tell "fix your state and retry" apart from "this artifact is bad".

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Operation invoked on state that does not satisfy its requirements
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Geometry that would produce non-finite or singular transforms
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported file extension (expected .json): {0}")]
    UnsupportedExtension(PathBuf),

    /// JSON parsed but matches neither the current nor the legacy schema
    #[error("record in {path} matches no known calibration schema")]
    UnrecognizedRecord { path: PathBuf },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Saving never overwrites an existing file
    #[error("refusing to overwrite existing file: {0}")]
    AlreadyExists(PathBuf),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("background task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for building a `Precondition` error from anything string-like
pub(crate) fn precondition(msg: impl Into<String>) -> Error {
    Error::Precondition(msg.into())
}
