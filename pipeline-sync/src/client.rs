//! Collaborators the sync handler reads from and writes to.
//!
//! Every call is synchronous and relies on the implementation's own timeout
//! handling. Implementations must be shareable across worker threads.

use pipeline_core::{ExternalJobConfig, Namespace, ObjectKey, Pipeline, StoreError};

use crate::error::RemoteError;

/// Point reads of namespaces, usually served from a watch cache.
pub trait NamespaceLister: Send + Sync {
    fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError>;
}

/// Point reads of pipelines, usually served from a watch cache.
pub trait PipelineLister: Send + Sync {
    fn get_pipeline(&self, key: &ObjectKey) -> Result<Option<Pipeline>, StoreError>;
}

/// Persists controller-owned metadata changes.
///
/// Must fail with [`StoreError::Conflict`] when `pipeline` was read at a
/// version the store has since moved past.
pub trait PipelineWriter: Send + Sync {
    fn update(&self, pipeline: &Pipeline) -> Result<Pipeline, StoreError>;
}

/// CRUD against the external pipeline-execution service.
pub trait JobConfigClient: Send + Sync {
    fn get_config(&self, namespace: &str, name: &str) -> Result<ExternalJobConfig, RemoteError>;

    fn create_config(
        &self,
        namespace: &str,
        pipeline: &Pipeline,
    ) -> Result<ExternalJobConfig, RemoteError>;

    fn update_config(
        &self,
        namespace: &str,
        pipeline: &Pipeline,
    ) -> Result<ExternalJobConfig, RemoteError>;

    fn delete_config(&self, namespace: &str, name: &str) -> Result<(), RemoteError>;
}
