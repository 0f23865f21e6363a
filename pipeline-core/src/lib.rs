//! Pipeline core library: domain types, controller-owned constants, and the
//! file-backed desired-state store.
//!
//! - [`types`]: keys, metadata, pipelines, namespaces, external job configs
//! - [`error`]: [`StoreError`], [`KeyError`]
//! - [`store`]: load / list / apply / update / delete against a root directory

pub mod error;
pub mod store;
pub mod types;

pub use error::{KeyError, StoreError};
pub use types::{
    ExternalJobConfig, Namespace, ObjectKey, ObjectMeta, OwnerReference, Pipeline, PipelineSpec,
    DEVOPS_PROJECT_KIND, DEVOPS_PROJECT_LABEL, PIPELINE_FINALIZER, SPEC_HASH_ANNOTATION,
    SYNC_STATUS_ANNOTATION, SYNC_STATUS_SUCCESSFUL,
};
