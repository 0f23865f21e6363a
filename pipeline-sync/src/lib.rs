//! # pipeline-sync
//!
//! Hash-gated reconciliation of pipeline resources against an external
//! job-configuration service.
//!
//! Build a [`SyncHandler`] from the collaborator traits in [`client`] and call
//! [`SyncHandler::sync`] with a `namespace/name` key. The handler is
//! synchronous; scheduling, retries and per-key serialization belong to the
//! caller.

pub mod client;
pub mod error;
pub mod events;
pub mod file_store;
pub mod handler;
pub mod job_store;
pub mod spec_hash;

pub use client::{JobConfigClient, NamespaceLister, PipelineLister, PipelineWriter};
pub use error::{RemoteError, RemoteOp, SyncError};
pub use events::{Event, EventRecorder, EventType, LogRecorder};
pub use file_store::FileStore;
pub use handler::{IneligibleNamespacePolicy, SyncAction, SyncHandler, SyncOutcome};
pub use job_store::DirJobConfigClient;
