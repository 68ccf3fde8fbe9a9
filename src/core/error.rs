//! Error types for the asset streamer

use thiserror::Error;

use crate::task::TaskTag;

/// Main error type for the streamer
#[derive(Debug, Error)]
pub enum Error {
    #[error("fetch of {hash} failed: {reason}")]
    Fetch { hash: String, reason: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Materialize error: {0}")]
    Materialize(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("no pool accepts {0:?} tasks")]
    Unroutable(TaskTag),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("worker dropped its result")]
    WorkerLost,

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("{tag:?} task received a {output} result")]
    OutputMismatch { tag: TaskTag, output: &'static str },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a fetch failure on `hash`.
    pub fn fetch(hash: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            hash: hash.into(),
            reason: reason.to_string(),
        }
    }
}
