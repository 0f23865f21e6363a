//! Domain types for pipelines and the namespaces that contain them.
//!
//! All types round-trip through serde so the same structs back the YAML store
//! files and the JSON job configs of the external service.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

// ---------------------------------------------------------------------------
// Controller-owned constants
// ---------------------------------------------------------------------------

/// Annotation recording the outcome of the last sync.
pub const SYNC_STATUS_ANNOTATION: &str = "pipeline.devops.io/sync-status";

/// Annotation recording the spec hash as of the last successful sync.
pub const SPEC_HASH_ANNOTATION: &str = "pipeline.devops.io/spec-hash";

/// The only value the controller writes into [`SYNC_STATUS_ANNOTATION`].
pub const SYNC_STATUS_SUCCESSFUL: &str = "successful";

/// Finalizer held while a remote job config may still exist.
pub const PIPELINE_FINALIZER: &str = "finalizers.devops.io/pipeline";

/// Label marking a namespace as belonging to a DevOps project.
pub const DEVOPS_PROJECT_LABEL: &str = "devops.io/project";

/// Owner kind a namespace must be controlled by to host pipelines.
pub const DEVOPS_PROJECT_KIND: &str = "DevOpsProject";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// `namespace/name` identity of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            self.name.fmt(f)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ObjectKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [name] => Ok(Self::new("", *name)),
            [namespace, name] => Ok(Self::new(*namespace, *name)),
            _ => Err(KeyError::Malformed(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Reference from an object to the object that controls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

/// Metadata shared by every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Opaque version token; changes on every write to the store.
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Deletion marker. `None` means the object is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Opaque structured pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSpec(pub serde_json::Value);

impl From<serde_json::Value> for PipelineSpec {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// The declaratively stored pipeline resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineSpec,
}

impl Pipeline {
    /// A fresh, unversioned pipeline.
    pub fn new(key: &ObjectKey, spec: PipelineSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                ..ObjectMeta::default()
            },
            spec,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds `finalizer` unless already present. Returns `true` if it was added.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.metadata.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes every occurrence of `finalizer`. Returns `true` if any was removed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != finalizer);
        self.metadata.finalizers.len() != before
    }
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// A namespace as seen by the controller. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub metadata: ObjectMeta,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Pipelines may only be synced inside namespaces that carry the DevOps
    /// project label and are owned by a DevOps project.
    pub fn is_eligible(&self) -> bool {
        self.metadata.labels.contains_key(DEVOPS_PROJECT_LABEL)
            && self
                .metadata
                .owner_references
                .iter()
                .any(|owner| owner.kind == DEVOPS_PROJECT_KIND)
    }
}

// ---------------------------------------------------------------------------
// External job config
// ---------------------------------------------------------------------------

/// The external service's representation of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalJobConfig {
    pub namespace: String,
    pub name: String,
    pub spec: PipelineSpec,
}

impl ExternalJobConfig {
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            namespace: pipeline.metadata.namespace.clone(),
            name: pipeline.metadata.name.clone(),
            spec: pipeline.spec.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
