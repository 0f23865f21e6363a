//! Pipeline controller runtime: watch cache, event enqueuer, dedup retry
//! queue and the worker pool driving the sync handler.

pub mod cache;
pub mod config;
pub mod enqueue;
mod error;
pub mod events;
pub mod paths;
pub mod queue;
mod runtime;

pub use cache::{HasSynced, StoreCache};
pub use config::{ControllerConfig, LogFormat};
pub use enqueue::{DeletedObject, Enqueuer, WatchEvent};
pub use error::ControllerError;
pub use events::EventBroadcaster;
pub use queue::{Backoff, TokenBucket, WorkQueue};
pub use runtime::{init_tracing, run_local, start_blocking, Controller, WorkerStats};
