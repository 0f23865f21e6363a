//! File-backed desired-state store.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   namespaces/
//!     <namespace>/
//!       namespace.yaml
//!       pipelines/
//!         <name>.yaml
//! ```
//!
//! # API pattern
//!
//! Every function takes an explicit `root`. Tests always pass a `TempDir`;
//! the binary resolves the root once via [`default_root`] or `--root`.
//!
//! Each write bumps `metadata.resource_version`. [`update_pipeline_at`] is the
//! only path the controller uses and enforces optimistic concurrency on it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{io_err, StoreError};
use crate::types::{Namespace, ObjectKey, Pipeline, PipelineSpec};

const NAMESPACES_DIR: &str = "namespaces";
const PIPELINES_DIR: &str = "pipelines";
const NAMESPACE_FILE: &str = "namespace.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `~/.pipelinectl`
pub fn default_root() -> Result<PathBuf, StoreError> {
    dirs::home_dir()
        .map(|home| home.join(".pipelinectl"))
        .ok_or(StoreError::HomeNotFound)
}

/// `<root>/namespaces/`
pub fn namespaces_dir_at(root: &Path) -> PathBuf {
    root.join(NAMESPACES_DIR)
}

/// `<root>/namespaces/<ns>/namespace.yaml`
pub fn namespace_path_at(root: &Path, namespace: &str) -> PathBuf {
    namespaces_dir_at(root).join(namespace).join(NAMESPACE_FILE)
}

/// `<root>/namespaces/<ns>/pipelines/<name>.yaml`
pub fn pipeline_path_at(root: &Path, key: &ObjectKey) -> PathBuf {
    namespaces_dir_at(root)
        .join(&key.namespace)
        .join(PIPELINES_DIR)
        .join(format!("{}.yaml", key.name))
}

/// What a path inside the store refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorePath {
    Namespace(String),
    Pipeline(ObjectKey),
}

/// Map a filesystem path back to the object it stores.
///
/// Returns `None` for temp files, directories, and anything outside the layout.
pub fn classify_path(root: &Path, path: &Path) -> Option<StorePath> {
    let relative = path.strip_prefix(namespaces_dir_at(root)).ok()?;
    let parts: Vec<&str> = relative.iter().filter_map(|p| p.to_str()).collect();
    match parts.as_slice() {
        [namespace, NAMESPACE_FILE] => Some(StorePath::Namespace((*namespace).to_string())),
        [namespace, PIPELINES_DIR, file] => file
            .strip_suffix(".yaml")
            .filter(|name| !name.is_empty())
            .map(|name| StorePath::Pipeline(ObjectKey::new(*namespace, name))),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// 2. Load / list
// ---------------------------------------------------------------------------

/// Load one pipeline. Absent → `Ok(None)`.
pub fn load_pipeline_at(root: &Path, key: &ObjectKey) -> Result<Option<Pipeline>, StoreError> {
    read_yaml(&pipeline_path_at(root, key))
}

/// Load one namespace. Absent → `Ok(None)`.
pub fn load_namespace_at(root: &Path, name: &str) -> Result<Option<Namespace>, StoreError> {
    read_yaml(&namespace_path_at(root, name))
}

/// All namespaces, sorted by name.
pub fn list_namespaces_at(root: &Path) -> Result<Vec<Namespace>, StoreError> {
    let mut namespaces = Vec::new();
    for dir in sorted_subdirs(&namespaces_dir_at(root))? {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(namespace) = load_namespace_at(root, name)? {
            namespaces.push(namespace);
        }
    }
    Ok(namespaces)
}

/// All pipelines across namespaces, sorted by (namespace, name).
pub fn list_pipelines_at(root: &Path) -> Result<Vec<Pipeline>, StoreError> {
    let mut pipelines = Vec::new();
    for dir in sorted_subdirs(&namespaces_dir_at(root))? {
        let pipelines_dir = dir.join(PIPELINES_DIR);
        let entries = match std::fs::read_dir(&pipelines_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&pipelines_dir, err)),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
            .collect();
        files.sort();
        for file in files {
            if let Some(pipeline) = read_yaml::<Pipeline>(&file)? {
                pipelines.push(pipeline);
            }
        }
    }
    Ok(pipelines)
}

// ---------------------------------------------------------------------------
// 3. Mutations
// ---------------------------------------------------------------------------

/// Create or replace a namespace.
pub fn save_namespace_at(root: &Path, namespace: &Namespace) -> Result<Namespace, StoreError> {
    let path = namespace_path_at(root, namespace.name());
    let current: Option<Namespace> = read_yaml(&path)?;
    let mut next = namespace.clone();
    next.metadata.resource_version =
        next_version(current.as_ref().map(|ns| ns.metadata.resource_version.as_str()));
    write_yaml(&path, &next)?;
    Ok(next)
}

/// Create the pipeline, or replace its spec while keeping its metadata.
pub fn apply_pipeline_at(
    root: &Path,
    key: &ObjectKey,
    spec: PipelineSpec,
) -> Result<Pipeline, StoreError> {
    let path = pipeline_path_at(root, key);
    let next = match read_yaml::<Pipeline>(&path)? {
        Some(mut existing) => {
            existing.spec = spec;
            existing.metadata.resource_version =
                next_version(Some(&existing.metadata.resource_version));
            existing
        }
        None => {
            let mut created = Pipeline::new(key, spec);
            created.metadata.resource_version = next_version(None);
            created
        }
    };
    write_yaml(&path, &next)?;
    Ok(next)
}

/// Write back a pipeline read earlier.
///
/// Fails with [`StoreError::Conflict`] if the stored version no longer matches
/// `pipeline.metadata.resource_version`. A pipeline that is being deleted and
/// holds no finalizers is removed instead of rewritten.
pub fn update_pipeline_at(root: &Path, pipeline: &Pipeline) -> Result<Pipeline, StoreError> {
    let key = pipeline.key();
    let path = pipeline_path_at(root, &key);
    let Some(current) = read_yaml::<Pipeline>(&path)? else {
        return Err(StoreError::NotFound {
            kind: "pipeline",
            key: key.to_string(),
        });
    };
    if current.metadata.resource_version != pipeline.metadata.resource_version {
        return Err(StoreError::Conflict {
            key: key.to_string(),
            expected: pipeline.metadata.resource_version.clone(),
            actual: current.metadata.resource_version,
        });
    }

    let mut next = pipeline.clone();
    next.metadata.resource_version = next_version(Some(&current.metadata.resource_version));
    if next.is_deleting() && next.metadata.finalizers.is_empty() {
        remove_file(&path)?;
    } else {
        write_yaml(&path, &next)?;
    }
    Ok(next)
}

/// Outcome of [`delete_pipeline_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// No finalizers were held; the file is gone.
    Removed,
    /// Finalizers are pending; the deletion marker is set.
    MarkedForDeletion { finalizers: Vec<String> },
}

/// Request deletion of a pipeline.
pub fn delete_pipeline_at(root: &Path, key: &ObjectKey) -> Result<DeleteOutcome, StoreError> {
    let path = pipeline_path_at(root, key);
    let Some(mut pipeline) = read_yaml::<Pipeline>(&path)? else {
        return Err(StoreError::NotFound {
            kind: "pipeline",
            key: key.to_string(),
        });
    };

    if pipeline.metadata.finalizers.is_empty() {
        remove_file(&path)?;
        return Ok(DeleteOutcome::Removed);
    }

    if pipeline.metadata.deletion_timestamp.is_none() {
        pipeline.metadata.deletion_timestamp = Some(Utc::now());
        pipeline.metadata.resource_version =
            next_version(Some(&pipeline.metadata.resource_version));
        write_yaml(&path, &pipeline)?;
    }
    Ok(DeleteOutcome::MarkedForDeletion {
        finalizers: pipeline.metadata.finalizers,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn next_version(current: Option<&str>) -> String {
    let current = current.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    (current + 1).to_string()
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize → `<file>.tmp` sibling → rename. The temp file lives in the same
/// directory so the rename never crosses filesystems.
fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let yaml = serde_yaml::to_string(value)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
