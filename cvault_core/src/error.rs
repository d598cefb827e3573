//! Error taxonomy for the versioned content store. Callers match on
//! `CoreError` to decide whether a failure is per-file (skip and continue),
//! fatal to the session, or user-visible.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("catalog storage error: {0}")]
    Catalog(#[from] anyhow::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("server rejected request: {0}")]
    Quota(String),

    #[error("no version found at or before the requested time")]
    NotFoundAtTime,

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("another session is already running")]
    Busy,

    #[error("session was cancelled")]
    Cancelled,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
