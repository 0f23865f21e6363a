use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the controller runtime, watch cache and configuration.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("store error: {0}")]
    Store(#[from] pipeline_core::StoreError),

    #[error("invalid controller config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("stop signal received before the watch cache synced")]
    CacheSyncAborted,

    #[error("{task} task join failure: {message}")]
    Join { task: String, message: String },

    #[error("signal handler failed: {0}")]
    Signal(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ControllerError {
    ControllerError::Io {
        path: path.into(),
        source,
    }
}
