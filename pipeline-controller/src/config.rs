//! Controller configuration, read from `<root>/controller.yaml`.
//!
//! Every field has a default, so a missing file and an empty file are both
//! valid. Command-line flags are applied on top by the caller.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pipeline_sync::IneligibleNamespacePolicy;

use crate::error::{io_err, ControllerError};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::paths::config_path;
use crate::queue::{
    Backoff, TokenBucket, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_RETRY_BURST,
    DEFAULT_RETRY_QPS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub workers: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_secs: u64,
    /// Overall retry rate shared by every key.
    pub retry_qps: u32,
    pub retry_burst: u32,
    pub cache_sync_poll_ms: u64,
    /// Full relist period; `0` turns periodic resync off.
    pub resync_interval_secs: u64,
    pub ineligible_namespace_policy: IneligibleNamespacePolicy,
    pub log_format: LogFormat,
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            backoff_base_ms: DEFAULT_BACKOFF_BASE.as_millis() as u64,
            backoff_max_secs: DEFAULT_BACKOFF_MAX.as_secs(),
            retry_qps: DEFAULT_RETRY_QPS,
            retry_burst: DEFAULT_RETRY_BURST,
            cache_sync_poll_ms: 100,
            resync_interval_secs: 30,
            ineligible_namespace_policy: IneligibleNamespacePolicy::default(),
            log_format: LogFormat::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Load `<root>/controller.yaml`, falling back to defaults when absent.
    pub fn load_at(root: &Path) -> Result<Self, ControllerError> {
        Self::load_from(&config_path(root))
    }

    pub fn load_from(path: &Path) -> Result<Self, ControllerError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(io_err(path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| ControllerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    /// Per-key backoff; `max` is never below `base`.
    pub fn backoff(&self) -> Backoff {
        let base = Duration::from_millis(self.backoff_base_ms.max(1));
        Backoff {
            base,
            max: Duration::from_secs(self.backoff_max_secs).max(base),
        }
    }

    /// Overall retry bucket; zero rates are raised to one.
    pub fn token_bucket(&self) -> TokenBucket {
        TokenBucket::new(self.retry_qps, self.retry_burst)
    }

    pub fn cache_sync_poll(&self) -> Duration {
        Duration::from_millis(self.cache_sync_poll_ms.max(1))
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}
