//! Listers and writer reading the file-backed store directly, without a cache.
//!
//! Used for one-shot syncs from the CLI and as the write path of the
//! long-running controller.

use std::path::{Path, PathBuf};

use pipeline_core::{store, Namespace, ObjectKey, Pipeline, StoreError};

use crate::client::{NamespaceLister, PipelineLister, PipelineWriter};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl NamespaceLister for FileStore {
    fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        store::load_namespace_at(&self.root, name)
    }
}

impl PipelineLister for FileStore {
    fn get_pipeline(&self, key: &ObjectKey) -> Result<Option<Pipeline>, StoreError> {
        store::load_pipeline_at(&self.root, key)
    }
}

impl PipelineWriter for FileStore {
    fn update(&self, pipeline: &Pipeline) -> Result<Pipeline, StoreError> {
        store::update_pipeline_at(&self.root, pipeline)
    }
}
