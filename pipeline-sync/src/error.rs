//! Error types for pipeline-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use pipeline_core::StoreError;

/// Failures reported by the external job-configuration service.
///
/// `NotFound` is kept distinct so callers can treat it as success where the
/// protocol allows (remote delete of an already-absent config).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("job config '{key}' not found")]
    NotFound { key: String },

    #[error("job config '{key}' already exists")]
    AlreadyExists { key: String },

    /// The service answered with a failure status.
    #[error("service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// The service could not be reached at all.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

/// Which remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Get,
    Create,
    Update,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOp::Get => write!(f, "get"),
            RemoteOp::Create => write!(f, "create"),
            RemoteOp::Update => write!(f, "update"),
        }
    }
}

/// Every error the sync handler returns is retryable; terminal conditions
/// (missing namespace, missing pipeline, malformed key) are reported as
/// successful outcomes instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read namespace '{namespace}': {source}")]
    NamespaceRead {
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot sync pipelines in namespace '{namespace}': not a DevOps project namespace")]
    IneligibleNamespace { namespace: String },

    #[error("failed to read pipeline '{key}': {source}")]
    PipelineRead {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to {op} job config for '{key}': {source}")]
    Remote {
        key: String,
        op: RemoteOp,
        #[source]
        source: RemoteError,
    },

    /// Remote delete failed with something other than not-found. The
    /// finalizer stays on the pipeline.
    #[error("failed to delete job config for '{key}', finalizer retained: {source}")]
    FinalizerRetained {
        key: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to update pipeline '{key}': {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// True when the write-back lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::StoreWrite { source, .. } if source.is_conflict())
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
