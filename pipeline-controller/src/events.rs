//! Event broadcaster: logs handler events and fans them out to subscribers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use pipeline_sync::{Event, EventRecorder, EventType};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

type SharedSender = Arc<Mutex<Option<broadcast::Sender<Event>>>>;

/// Owns the broadcast channel for the lifetime of one controller run.
pub struct EventBroadcaster {
    sender: SharedSender,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Recorder handed to the sync handler.
    pub fn recorder(&self) -> Arc<dyn EventRecorder> {
        Arc::new(BroadcastRecorder {
            sender: self.sender.clone(),
        })
    }

    /// `None` once the broadcaster has been shut down.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Event>> {
        lock(&self.sender).as_ref().map(broadcast::Sender::subscribe)
    }

    /// Close the channel. Subscribers drain what is buffered and then see
    /// `RecvError::Closed`; later events are only logged.
    pub fn shutdown(&self) {
        if lock(&self.sender).take().is_some() {
            tracing::debug!("event broadcaster shut down");
        }
    }
}

struct BroadcastRecorder {
    sender: SharedSender,
}

impl EventRecorder for BroadcastRecorder {
    fn record(&self, event: Event) {
        match event.event_type {
            EventType::Normal => tracing::info!(
                key = %event.key,
                reason = %event.reason,
                "{}",
                event.message
            ),
            EventType::Warning => tracing::warn!(
                key = %event.key,
                reason = %event.reason,
                "{}",
                event.message
            ),
        }

        if let Some(sender) = lock(&self.sender).as_ref() {
            // No subscribers is not an error.
            let _ = sender.send(event);
        }
    }
}

fn lock(sender: &SharedSender) -> MutexGuard<'_, Option<broadcast::Sender<Event>>> {
    sender.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::ObjectKey;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscribers_receive_recorded_events() {
        let broadcaster = EventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe().expect("open");
        let recorder = broadcaster.recorder();

        recorder.record(Event::normal(&ObjectKey::new("team-a", "build"), "Synced", "ok"));
        let event = rx.recv().await.expect("event");
        assert_eq!(event.reason, "Synced");
        assert_eq!(event.key.to_string(), "team-a/build");
    }

    #[tokio::test]
    async fn shutdown_closes_subscribers_and_keeps_recorder_usable() {
        let broadcaster = EventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe().expect("open");
        let recorder = broadcaster.recorder();

        broadcaster.shutdown();
        recorder.record(Event::warning(&ObjectKey::new("team-a", "build"), "FailedSync", "late"));

        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert!(broadcaster.subscribe().is_none());
    }
}
