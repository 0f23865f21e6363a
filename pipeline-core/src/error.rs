//! Error types for pipeline-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can arise from desired-state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The object did not exist when a mutation required it.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    /// Optimistic-concurrency failure: the stored version moved on.
    #[error("conflict updating '{key}': expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: String,
        actual: String,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or pass --root")]
    HomeNotFound,
}

impl StoreError {
    /// True for optimistic-concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// A queue key that does not follow the `namespace/name` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("unexpected key format: '{0}'")]
    Malformed(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
