//! Directory-backed job-configuration service.
//!
//! Persists one JSON document per job at
//! `<root>/jobs/<namespace>/<name>.json`. Writes use the same atomic `.tmp` +
//! rename pattern as the pipeline store. Stands in for the remote
//! pipeline-execution service when running against a local store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pipeline_core::{ExternalJobConfig, ObjectKey, Pipeline};

use crate::client::JobConfigClient;
use crate::error::{io_err, RemoteError};

#[derive(Debug, Clone)]
pub struct DirJobConfigClient {
    root: PathBuf,
}

impl DirJobConfigClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/jobs/<namespace>/<name>.json`
    pub fn config_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.root
            .join("jobs")
            .join(namespace)
            .join(format!("{name}.json"))
    }

    /// Every stored job config, sorted by (namespace, name).
    pub fn list(&self) -> Result<Vec<ExternalJobConfig>, RemoteError> {
        let jobs = self.root.join("jobs");
        let mut configs = Vec::new();
        for dir in read_sorted(&jobs)? {
            if !dir.is_dir() {
                continue;
            }
            for file in read_sorted(&dir)? {
                if file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(config) = load(&file)? {
                    configs.push(config);
                }
            }
        }
        Ok(configs)
    }

    fn save(&self, config: &ExternalJobConfig) -> Result<(), RemoteError> {
        let path = self.config_path(&config.namespace, &config.name);
        let Some(dir) = path.parent() else {
            return Err(io_err(
                path,
                std::io::Error::other("invalid job config path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let json = serde_json::to_string_pretty(config)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(err) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, err));
        }
        Ok(())
    }

    fn not_found(namespace: &str, name: &str) -> RemoteError {
        RemoteError::NotFound {
            key: ObjectKey::new(namespace, name).to_string(),
        }
    }
}

impl JobConfigClient for DirJobConfigClient {
    fn get_config(&self, namespace: &str, name: &str) -> Result<ExternalJobConfig, RemoteError> {
        load(&self.config_path(namespace, name))?.ok_or_else(|| Self::not_found(namespace, name))
    }

    fn create_config(
        &self,
        namespace: &str,
        pipeline: &Pipeline,
    ) -> Result<ExternalJobConfig, RemoteError> {
        let name = &pipeline.metadata.name;
        if self.config_path(namespace, name).exists() {
            return Err(RemoteError::AlreadyExists {
                key: ObjectKey::new(namespace, name.as_str()).to_string(),
            });
        }
        let config = job_config(namespace, pipeline);
        self.save(&config)?;
        tracing::info!("created job config {namespace}/{name}");
        Ok(config)
    }

    fn update_config(
        &self,
        namespace: &str,
        pipeline: &Pipeline,
    ) -> Result<ExternalJobConfig, RemoteError> {
        let name = &pipeline.metadata.name;
        if !self.config_path(namespace, name).exists() {
            return Err(Self::not_found(namespace, name));
        }
        let config = job_config(namespace, pipeline);
        self.save(&config)?;
        tracing::info!("updated job config {namespace}/{name}");
        Ok(config)
    }

    fn delete_config(&self, namespace: &str, name: &str) -> Result<(), RemoteError> {
        let path = self.config_path(namespace, name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("deleted job config {namespace}/{name}");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Self::not_found(namespace, name)),
            Err(err) => Err(io_err(&path, err)),
        }
    }
}

fn job_config(namespace: &str, pipeline: &Pipeline) -> ExternalJobConfig {
    ExternalJobConfig {
        namespace: namespace.to_string(),
        name: pipeline.metadata.name.clone(),
        spec: pipeline.spec.clone(),
    }
}

fn load(path: &Path) -> Result<Option<ExternalJobConfig>, RemoteError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

fn read_sorted(dir: &Path) -> Result<Vec<PathBuf>, RemoteError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}
