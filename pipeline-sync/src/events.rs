//! Events emitted by the sync handler for external observers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pipeline_core::ObjectKey;

pub const REASON_SYNCED: &str = "Synced";
pub const REASON_FAILED_SYNC: &str = "FailedSync";
pub const REASON_FAILED_DELETE: &str = "FailedDelete";
pub const REASON_FINALIZED: &str = "Finalized";
pub const REASON_INELIGIBLE_NAMESPACE: &str = "IneligibleNamespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub key: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn normal(key: &ObjectKey, reason: &str, message: impl Into<String>) -> Self {
        Self::new(key, EventType::Normal, reason, message)
    }

    pub fn warning(key: &ObjectKey, reason: &str, message: impl Into<String>) -> Self {
        Self::new(key, EventType::Warning, reason, message)
    }

    fn new(key: &ObjectKey, event_type: EventType, reason: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Sink for handler events. Injected so its lifecycle belongs to the caller.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: Event);
}

/// Writes events to the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn record(&self, event: Event) {
        match event.event_type {
            EventType::Normal => {
                tracing::info!("{} {}: {}", event.key, event.reason, event.message)
            }
            EventType::Warning => {
                tracing::warn!("{} {}: {}", event.key, event.reason, event.message)
            }
        }
    }
}
