//! Turns watch notifications into queue keys.

use pipeline_core::{ObjectKey, Pipeline};

use crate::queue::WorkQueue;

/// Object carried by a delete notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletedObject {
    /// Last state the cache held.
    Known(Pipeline),
    /// Only the key survived; the final state was never observed.
    Tombstone(ObjectKey),
}

impl DeletedObject {
    pub fn key(&self) -> ObjectKey {
        match self {
            DeletedObject::Known(pipeline) => pipeline.key(),
            DeletedObject::Tombstone(key) => key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Pipeline),
    Updated { old: Pipeline, new: Pipeline },
    Deleted(DeletedObject),
}

#[derive(Clone)]
pub struct Enqueuer {
    queue: WorkQueue,
}

impl Enqueuer {
    pub fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }

    pub fn handle(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(pipeline) => self.on_add(&pipeline),
            WatchEvent::Updated { old, new } => self.on_update(&old, &new),
            WatchEvent::Deleted(object) => self.on_delete(&object),
        }
    }

    pub fn on_add(&self, pipeline: &Pipeline) {
        self.enqueue(pipeline.key());
    }

    /// Same `resource_version` on both sides means a resync replay, not a change.
    pub fn on_update(&self, old: &Pipeline, new: &Pipeline) {
        if old.metadata.resource_version == new.metadata.resource_version {
            return;
        }
        self.enqueue(new.key());
    }

    pub fn on_delete(&self, object: &DeletedObject) {
        self.enqueue(object.key());
    }

    fn enqueue(&self, key: ObjectKey) {
        tracing::debug!(key = %key, "enqueue");
        self.queue.add(&key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::PipelineSpec;
    use serde_json::json;

    fn pipeline(name: &str, version: &str) -> Pipeline {
        let mut p = Pipeline::new(&ObjectKey::new("team-a", name), PipelineSpec(json!({})));
        p.metadata.resource_version = version.to_string();
        p
    }

    #[tokio::test]
    async fn add_enqueues_namespaced_key() {
        let queue = WorkQueue::default();
        Enqueuer::new(queue.clone()).on_add(&pipeline("build", "1"));
        assert_eq!(queue.next().await.as_deref(), Some("team-a/build"));
    }

    #[test]
    fn update_with_same_version_is_dropped() {
        let queue = WorkQueue::default();
        let enqueuer = Enqueuer::new(queue.clone());

        enqueuer.on_update(&pipeline("build", "3"), &pipeline("build", "3"));
        assert!(queue.is_empty());

        enqueuer.on_update(&pipeline("build", "3"), &pipeline("build", "4"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn tombstone_and_known_deletes_both_enqueue() {
        let queue = WorkQueue::default();
        let enqueuer = Enqueuer::new(queue.clone());

        enqueuer.handle(WatchEvent::Deleted(DeletedObject::Tombstone(ObjectKey::new(
            "team-a", "gone",
        ))));
        enqueuer.handle(WatchEvent::Deleted(DeletedObject::Known(pipeline("build", "7"))));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn burst_of_events_for_one_key_yields_one_item() {
        let queue = WorkQueue::default();
        let enqueuer = Enqueuer::new(queue.clone());

        enqueuer.handle(WatchEvent::Added(pipeline("build", "1")));
        enqueuer.handle(WatchEvent::Updated {
            old: pipeline("build", "1"),
            new: pipeline("build", "2"),
        });
        enqueuer.handle(WatchEvent::Deleted(DeletedObject::Known(pipeline("build", "2"))));
        assert_eq!(queue.len(), 1);
    }
}
