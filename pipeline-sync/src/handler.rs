//! Sync handler: the reconciliation state machine for one pipeline key.
//!
//! ## Step order of `sync`
//!
//! 1. Parse the key. Malformed → dropped.
//! 2. Resolve the namespace. Missing → dropped. Ineligible → error (or dropped
//!    under [`IneligibleNamespacePolicy::Drop`]).
//! 3. Resolve the pipeline. Missing → dropped.
//! 4. Clone it and mutate only the clone:
//!    - live: ensure the finalizer, skip remote work if the stored spec hash
//!      still matches, else get → create / update / nothing, then stamp
//!      `sync-status` and `spec-hash`;
//!    - deleting: delete remotely (not-found counts as success) and only then
//!      drop the finalizer.
//! 5. Write the clone back iff it differs from what was read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pipeline_core::{
    ObjectKey, Pipeline, PIPELINE_FINALIZER, SPEC_HASH_ANNOTATION, SYNC_STATUS_ANNOTATION,
    SYNC_STATUS_SUCCESSFUL,
};

use crate::client::{JobConfigClient, NamespaceLister, PipelineLister, PipelineWriter};
use crate::error::{RemoteError, RemoteOp, SyncError};
use crate::events::{
    Event, EventRecorder, REASON_FAILED_DELETE, REASON_FAILED_SYNC, REASON_FINALIZED,
    REASON_INELIGIBLE_NAMESPACE, REASON_SYNCED,
};
use crate::spec_hash;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a successful `sync` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Key was not `namespace/name`; nothing can ever be done with it.
    InvalidKey,
    /// The namespace no longer exists.
    NamespaceGone,
    /// Namespace is ineligible and the policy says to drop the key.
    NamespaceIneligible,
    /// The pipeline no longer exists.
    PipelineGone,
    /// Stored spec hash matched; no remote call was made.
    UpToDate,
    /// Remote config was absent and has been created.
    Created,
    /// Remote config differed and has been updated.
    Updated,
    /// Remote config already matched the local spec.
    Unchanged,
    /// Remote config is gone and the finalizer has been removed.
    Finalized,
    /// Pipeline is being deleted but our finalizer was already gone.
    AlreadyFinalized,
}

impl SyncAction {
    /// True for actions that called the external service.
    pub fn touched_remote(self) -> bool {
        matches!(
            self,
            SyncAction::Created | SyncAction::Updated | SyncAction::Unchanged | SyncAction::Finalized
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The raw queue key.
    pub key: String,
    pub action: SyncAction,
    /// Whether the pipeline metadata was written back to the store.
    pub persisted: bool,
}

/// How to treat a key whose namespace exists but is not a DevOps project
/// namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IneligibleNamespacePolicy {
    /// Return an error so the queue retries with backoff.
    #[default]
    Retry,
    /// Report success and drop the key until the next change event.
    Drop,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Reconciles one pipeline key per call. Cheap to share across workers.
pub struct SyncHandler {
    namespaces: Arc<dyn NamespaceLister>,
    pipelines: Arc<dyn PipelineLister>,
    remote: Arc<dyn JobConfigClient>,
    writer: Arc<dyn PipelineWriter>,
    recorder: Arc<dyn EventRecorder>,
    ineligible_policy: IneligibleNamespacePolicy,
}

impl SyncHandler {
    pub fn new(
        namespaces: Arc<dyn NamespaceLister>,
        pipelines: Arc<dyn PipelineLister>,
        remote: Arc<dyn JobConfigClient>,
        writer: Arc<dyn PipelineWriter>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            namespaces,
            pipelines,
            remote,
            writer,
            recorder,
            ineligible_policy: IneligibleNamespacePolicy::default(),
        }
    }

    pub fn with_ineligible_policy(mut self, policy: IneligibleNamespacePolicy) -> Self {
        self.ineligible_policy = policy;
        self
    }

    /// Converge the pipeline named by `raw_key` towards the external service.
    ///
    /// Every `Err` is retryable. Terminal conditions come back as `Ok` with
    /// the matching [`SyncAction`].
    pub fn sync(&self, raw_key: &str) -> Result<SyncOutcome, SyncError> {
        let outcome = |action, persisted| SyncOutcome {
            key: raw_key.to_string(),
            action,
            persisted,
        };

        let key = match raw_key.parse::<ObjectKey>() {
            Ok(key) => key,
            Err(err) => {
                tracing::error!("dropping work item: {err}");
                return Ok(outcome(SyncAction::InvalidKey, false));
            }
        };

        let namespace = self
            .namespaces
            .get_namespace(&key.namespace)
            .map_err(|source| SyncError::NamespaceRead {
                namespace: key.namespace.clone(),
                source,
            })?;
        let Some(namespace) = namespace else {
            tracing::info!("namespace of '{key}' no longer exists");
            return Ok(outcome(SyncAction::NamespaceGone, false));
        };
        if !namespace.is_eligible() {
            self.recorder.record(Event::warning(
                &key,
                REASON_INELIGIBLE_NAMESPACE,
                format!("namespace '{}' is not a DevOps project namespace", namespace.name()),
            ));
            return match self.ineligible_policy {
                IneligibleNamespacePolicy::Retry => Err(SyncError::IneligibleNamespace {
                    namespace: key.namespace.clone(),
                }),
                IneligibleNamespacePolicy::Drop => {
                    Ok(outcome(SyncAction::NamespaceIneligible, false))
                }
            };
        }

        let original = self
            .pipelines
            .get_pipeline(&key)
            .map_err(|source| SyncError::PipelineRead {
                key: key.to_string(),
                source,
            })?;
        let Some(original) = original else {
            tracing::debug!("pipeline '{key}' no longer exists");
            return Ok(outcome(SyncAction::PipelineGone, false));
        };

        let mut copy = original.clone();
        let action = if copy.is_deleting() {
            self.finalize(&key, &mut copy)?
        } else {
            self.reconcile_live(&key, &mut copy)?
        };

        let persisted = copy != original;
        if persisted {
            self.writer
                .update(&copy)
                .map_err(|source| SyncError::StoreWrite {
                    key: key.to_string(),
                    source,
                })?;
        }

        tracing::debug!("synced '{key}': {action:?} (persisted: {persisted})");
        Ok(outcome(action, persisted))
    }

    fn reconcile_live(&self, key: &ObjectKey, copy: &mut Pipeline) -> Result<SyncAction, SyncError> {
        copy.add_finalizer(PIPELINE_FINALIZER);

        let spec_hash = spec_hash::compute(&copy.spec);
        if is_up_to_date(copy, &spec_hash) {
            tracing::debug!("pipeline '{key}' unchanged since last sync, skipping remote");
            return Ok(SyncAction::UpToDate);
        }

        let action = match self.remote.get_config(&key.namespace, &key.name) {
            Ok(existing) if existing.spec == copy.spec => {
                tracing::debug!("job config for '{key}' already matches");
                SyncAction::Unchanged
            }
            Ok(_) => {
                self.remote
                    .update_config(&key.namespace, copy)
                    .map_err(|source| self.remote_failure(key, RemoteOp::Update, source))?;
                SyncAction::Updated
            }
            Err(err) if err.is_not_found() => {
                self.remote
                    .create_config(&key.namespace, copy)
                    .map_err(|source| self.remote_failure(key, RemoteOp::Create, source))?;
                SyncAction::Created
            }
            Err(source) => return Err(self.remote_failure(key, RemoteOp::Get, source)),
        };

        if matches!(action, SyncAction::Created | SyncAction::Updated) {
            self.recorder.record(Event::normal(
                key,
                REASON_SYNCED,
                format!("job config {}", if action == SyncAction::Created { "created" } else { "updated" }),
            ));
        }

        let annotations = &mut copy.metadata.annotations;
        annotations.insert(
            SYNC_STATUS_ANNOTATION.to_string(),
            SYNC_STATUS_SUCCESSFUL.to_string(),
        );
        annotations.insert(SPEC_HASH_ANNOTATION.to_string(), spec_hash);
        Ok(action)
    }

    fn finalize(&self, key: &ObjectKey, copy: &mut Pipeline) -> Result<SyncAction, SyncError> {
        if !copy.has_finalizer(PIPELINE_FINALIZER) {
            return Ok(SyncAction::AlreadyFinalized);
        }

        match self.remote.delete_config(&key.namespace, &key.name) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!("job config for '{key}' already absent");
            }
            Err(source) => {
                // The finalizer is the only record that a remote config may
                // still exist; it stays until a delete is confirmed.
                self.recorder.record(Event::warning(
                    key,
                    REASON_FAILED_DELETE,
                    format!("failed to delete job config: {source}"),
                ));
                return Err(SyncError::FinalizerRetained {
                    key: key.to_string(),
                    source,
                });
            }
        }

        copy.remove_finalizer(PIPELINE_FINALIZER);
        self.recorder
            .record(Event::normal(key, REASON_FINALIZED, "job config deleted"));
        Ok(SyncAction::Finalized)
    }

    fn remote_failure(&self, key: &ObjectKey, op: RemoteOp, source: RemoteError) -> SyncError {
        self.recorder.record(Event::warning(
            key,
            REASON_FAILED_SYNC,
            format!("failed to {op} job config: {source}"),
        ));
        SyncError::Remote {
            key: key.to_string(),
            op,
            source,
        }
    }
}

fn is_up_to_date(pipeline: &Pipeline, spec_hash: &str) -> bool {
    pipeline.annotation(SYNC_STATUS_ANNOTATION) == Some(SYNC_STATUS_SUCCESSFUL)
        && pipeline.annotation(SPEC_HASH_ANNOTATION) == Some(spec_hash)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;
    use pipeline_core::{
        ExternalJobConfig, Namespace, OwnerReference, PipelineSpec, StoreError,
        DEVOPS_PROJECT_KIND, DEVOPS_PROJECT_LABEL,
    };
    use serde_json::json;

    use crate::events::EventType;

    // -- in-memory collaborators ---------------------------------------------

    #[derive(Default)]
    struct Fake {
        namespaces: Mutex<HashMap<String, Namespace>>,
        pipelines: Mutex<HashMap<ObjectKey, Pipeline>>,
        remote: Mutex<HashMap<ObjectKey, ExternalJobConfig>>,
        remote_calls: Mutex<Vec<&'static str>>,
        fail_delete_with: Mutex<Option<u16>>,
        fail_get_with: Mutex<Option<u16>>,
        conflict_on_write: Mutex<bool>,
        writes: Mutex<usize>,
        events: Mutex<Vec<Event>>,
    }

    impl Fake {
        fn remote_calls(&self) -> Vec<&'static str> {
            self.remote_calls.lock().unwrap().clone()
        }

        fn stored(&self, key: &ObjectKey) -> Option<Pipeline> {
            self.pipelines.lock().unwrap().get(key).cloned()
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl NamespaceLister for Fake {
        fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
            Ok(self.namespaces.lock().unwrap().get(name).cloned())
        }
    }

    impl PipelineLister for Fake {
        fn get_pipeline(&self, key: &ObjectKey) -> Result<Option<Pipeline>, StoreError> {
            Ok(self.stored(key))
        }
    }

    impl PipelineWriter for Fake {
        fn update(&self, pipeline: &Pipeline) -> Result<Pipeline, StoreError> {
            if *self.conflict_on_write.lock().unwrap() {
                return Err(StoreError::Conflict {
                    key: pipeline.key().to_string(),
                    expected: pipeline.metadata.resource_version.clone(),
                    actual: "99".to_string(),
                });
            }
            *self.writes.lock().unwrap() += 1;
            let mut next = pipeline.clone();
            let version: u64 = next.metadata.resource_version.parse().unwrap_or(0);
            next.metadata.resource_version = (version + 1).to_string();
            self.pipelines
                .lock()
                .unwrap()
                .insert(next.key(), next.clone());
            Ok(next)
        }
    }

    impl JobConfigClient for Fake {
        fn get_config(&self, namespace: &str, name: &str) -> Result<ExternalJobConfig, RemoteError> {
            self.remote_calls.lock().unwrap().push("get");
            if let Some(status) = *self.fail_get_with.lock().unwrap() {
                return Err(RemoteError::Service {
                    status,
                    message: "boom".to_string(),
                });
            }
            let key = ObjectKey::new(namespace, name);
            self.remote
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(RemoteError::NotFound {
                    key: key.to_string(),
                })
        }

        fn create_config(
            &self,
            namespace: &str,
            pipeline: &Pipeline,
        ) -> Result<ExternalJobConfig, RemoteError> {
            self.remote_calls.lock().unwrap().push("create");
            let config = ExternalJobConfig {
                namespace: namespace.to_string(),
                name: pipeline.metadata.name.clone(),
                spec: pipeline.spec.clone(),
            };
            self.remote
                .lock()
                .unwrap()
                .insert(pipeline.key(), config.clone());
            Ok(config)
        }

        fn update_config(
            &self,
            namespace: &str,
            pipeline: &Pipeline,
        ) -> Result<ExternalJobConfig, RemoteError> {
            self.remote_calls.lock().unwrap().push("update");
            let config = ExternalJobConfig {
                namespace: namespace.to_string(),
                name: pipeline.metadata.name.clone(),
                spec: pipeline.spec.clone(),
            };
            self.remote
                .lock()
                .unwrap()
                .insert(pipeline.key(), config.clone());
            Ok(config)
        }

        fn delete_config(&self, namespace: &str, name: &str) -> Result<(), RemoteError> {
            self.remote_calls.lock().unwrap().push("delete");
            let key = ObjectKey::new(namespace, name);
            if let Some(status) = *self.fail_delete_with.lock().unwrap() {
                return Err(RemoteError::Service {
                    status,
                    message: "jenkins unavailable".to_string(),
                });
            }
            match self.remote.lock().unwrap().remove(&key) {
                Some(_) => Ok(()),
                None => Err(RemoteError::NotFound {
                    key: key.to_string(),
                }),
            }
        }
    }

    impl EventRecorder for Fake {
        fn record(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    // -- fixtures ------------------------------------------------------------

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn key() -> ObjectKey {
        ObjectKey::new("team-a", "build")
    }

    fn spec(revision: i64) -> PipelineSpec {
        PipelineSpec(json!({ "type": "pipeline", "pipeline": { "revision": revision } }))
    }

    fn eligible_namespace(name: &str) -> Namespace {
        let mut ns = Namespace::new(name);
        ns.metadata
            .labels
            .insert(DEVOPS_PROJECT_LABEL.to_string(), name.to_string());
        ns.metadata.owner_references.push(OwnerReference {
            kind: DEVOPS_PROJECT_KIND.to_string(),
            name: name.to_string(),
            controller: Some(true),
        });
        ns
    }

    fn stored_pipeline(revision: i64) -> Pipeline {
        let mut p = Pipeline::new(&key(), spec(revision));
        p.metadata.resource_version = "1".to_string();
        p
    }

    fn setup(pipeline: Option<Pipeline>) -> (Arc<Fake>, SyncHandler) {
        init_logging();
        let fake = Arc::new(Fake::default());
        fake.namespaces
            .lock()
            .unwrap()
            .insert("team-a".to_string(), eligible_namespace("team-a"));
        if let Some(p) = pipeline {
            fake.pipelines.lock().unwrap().insert(p.key(), p);
        }
        let handler = SyncHandler::new(
            fake.clone(),
            fake.clone(),
            fake.clone(),
            fake.clone(),
            fake.clone(),
        );
        (fake, handler)
    }

    fn mark_deleting(fake: &Fake, with_finalizer: bool) {
        let mut pipelines = fake.pipelines.lock().unwrap();
        let p = pipelines.get_mut(&key()).unwrap();
        p.metadata.deletion_timestamp = Some(Utc::now());
        if with_finalizer {
            p.add_finalizer(PIPELINE_FINALIZER);
        }
    }

    // -- live path -----------------------------------------------------------

    #[test]
    fn new_pipeline_is_created_remotely_and_stamped() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::Created);
        assert!(outcome.persisted);
        assert_eq!(fake.remote_calls(), vec!["get", "create"]);

        let stored = fake.stored(&key()).unwrap();
        assert!(stored.has_finalizer(PIPELINE_FINALIZER));
        assert_eq!(stored.annotation(SYNC_STATUS_ANNOTATION), Some(SYNC_STATUS_SUCCESSFUL));
        assert_eq!(
            stored.annotation(SPEC_HASH_ANNOTATION),
            Some(spec_hash::compute(&spec(1)).as_str())
        );
        assert!(fake.events().iter().any(|e| e.reason == REASON_SYNCED));
    }

    #[test]
    fn second_sync_makes_no_remote_calls() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        handler.sync("team-a/build").expect("first sync");
        let calls_after_first = fake.remote_calls().len();
        let writes_after_first = *fake.writes.lock().unwrap();

        let outcome = handler.sync("team-a/build").expect("second sync");
        assert_eq!(outcome.action, SyncAction::UpToDate);
        assert!(!outcome.persisted);
        assert_eq!(fake.remote_calls().len(), calls_after_first);
        assert_eq!(*fake.writes.lock().unwrap(), writes_after_first);
    }

    #[test]
    fn fast_path_still_adds_missing_finalizer() {
        let mut p = stored_pipeline(1);
        p.metadata.annotations.insert(
            SYNC_STATUS_ANNOTATION.to_string(),
            SYNC_STATUS_SUCCESSFUL.to_string(),
        );
        p.metadata
            .annotations
            .insert(SPEC_HASH_ANNOTATION.to_string(), spec_hash::compute(&spec(1)));
        let (fake, handler) = setup(Some(p));

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::UpToDate);
        assert!(outcome.persisted, "finalizer addition must be written");
        assert!(fake.remote_calls().is_empty());
        assert!(fake.stored(&key()).unwrap().has_finalizer(PIPELINE_FINALIZER));
    }

    #[test]
    fn changed_spec_updates_remote_and_rehashes() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        handler.sync("team-a/build").expect("first sync");

        fake.pipelines
            .lock()
            .unwrap()
            .get_mut(&key())
            .unwrap()
            .spec = spec(2);

        let outcome = handler.sync("team-a/build").expect("second sync");
        assert_eq!(outcome.action, SyncAction::Updated);
        assert_eq!(fake.remote_calls(), vec!["get", "create", "get", "update"]);
        assert_eq!(
            fake.remote.lock().unwrap().get(&key()).unwrap().spec,
            spec(2)
        );
        assert_eq!(
            fake.stored(&key()).unwrap().annotation(SPEC_HASH_ANNOTATION),
            Some(spec_hash::compute(&spec(2)).as_str())
        );
    }

    #[test]
    fn identical_remote_config_needs_no_write_call() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        fake.remote.lock().unwrap().insert(
            key(),
            ExternalJobConfig::from_pipeline(&stored_pipeline(1)),
        );

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::Unchanged);
        assert_eq!(fake.remote_calls(), vec!["get"]);
        let stored = fake.stored(&key()).unwrap();
        assert_eq!(stored.annotation(SYNC_STATUS_ANNOTATION), Some(SYNC_STATUS_SUCCESSFUL));
    }

    #[test]
    fn stale_hash_with_successful_status_resyncs() {
        let mut p = stored_pipeline(2);
        p.add_finalizer(PIPELINE_FINALIZER);
        p.metadata.annotations.insert(
            SYNC_STATUS_ANNOTATION.to_string(),
            SYNC_STATUS_SUCCESSFUL.to_string(),
        );
        p.metadata
            .annotations
            .insert(SPEC_HASH_ANNOTATION.to_string(), spec_hash::compute(&spec(1)));
        let (fake, handler) = setup(Some(p));

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::Created);
        assert_eq!(fake.remote_calls(), vec!["get", "create"]);
    }

    #[test]
    fn remote_get_failure_is_retryable_and_does_not_create() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        *fake.fail_get_with.lock().unwrap() = Some(503);

        let err = handler.sync("team-a/build").unwrap_err();
        assert!(matches!(err, SyncError::Remote { op: RemoteOp::Get, .. }));
        assert_eq!(fake.remote_calls(), vec!["get"]);
        assert_eq!(*fake.writes.lock().unwrap(), 0, "nothing is persisted on failure");
        assert!(fake
            .events()
            .iter()
            .any(|e| e.reason == REASON_FAILED_SYNC && e.event_type == EventType::Warning));
    }

    #[test]
    fn write_conflict_is_reported_as_retryable_conflict() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        *fake.conflict_on_write.lock().unwrap() = true;

        let err = handler.sync("team-a/build").unwrap_err();
        assert!(err.is_conflict());

        // Replaying after the conflict clears is safe: the remote config
        // already matches, so no second create happens.
        *fake.conflict_on_write.lock().unwrap() = false;
        let outcome = handler.sync("team-a/build").expect("replay");
        assert_eq!(outcome.action, SyncAction::Unchanged);
        assert_eq!(fake.remote_calls(), vec!["get", "create", "get"]);
    }

    // -- eligibility & terminal cases ----------------------------------------

    #[test]
    fn missing_namespace_is_terminal_success() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        fake.namespaces.lock().unwrap().clear();

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::NamespaceGone);
        assert!(fake.remote_calls().is_empty());
    }

    #[test]
    fn missing_pipeline_is_terminal_success() {
        let (fake, handler) = setup(None);
        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::PipelineGone);
        assert!(!outcome.persisted);
        assert!(fake.remote_calls().is_empty());
    }

    #[test]
    fn malformed_key_is_dropped() {
        let (fake, handler) = setup(None);
        let outcome = handler.sync("a/b/c").expect("sync");
        assert_eq!(outcome.action, SyncAction::InvalidKey);
        assert!(fake.remote_calls().is_empty());
    }

    #[test]
    fn ineligible_namespace_never_reaches_remote() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        fake.namespaces
            .lock()
            .unwrap()
            .insert("team-a".to_string(), Namespace::new("team-a"));

        let err = handler.sync("team-a/build").unwrap_err();
        assert!(matches!(err, SyncError::IneligibleNamespace { .. }));
        assert!(fake.remote_calls().is_empty());
        assert_eq!(*fake.writes.lock().unwrap(), 0);
        assert!(fake
            .events()
            .iter()
            .any(|e| e.reason == REASON_INELIGIBLE_NAMESPACE));
    }

    #[test]
    fn ineligible_namespace_can_be_dropped_by_policy() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        let handler = handler.with_ineligible_policy(IneligibleNamespacePolicy::Drop);
        fake.namespaces
            .lock()
            .unwrap()
            .insert("team-a".to_string(), Namespace::new("team-a"));

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::NamespaceIneligible);
        assert!(fake.remote_calls().is_empty());
    }

    // -- deletion path -------------------------------------------------------

    #[test]
    fn delete_not_found_counts_as_success_and_drops_finalizer() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        mark_deleting(&fake, true);

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::Finalized);
        assert!(outcome.persisted);
        assert_eq!(fake.remote_calls(), vec!["delete"]);
        assert!(!fake.stored(&key()).unwrap().has_finalizer(PIPELINE_FINALIZER));
    }

    #[test]
    fn delete_success_drops_finalizer_and_remote_config() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        handler.sync("team-a/build").expect("create");
        mark_deleting(&fake, false);

        let outcome = handler.sync("team-a/build").expect("finalize");
        assert_eq!(outcome.action, SyncAction::Finalized);
        assert!(fake.remote.lock().unwrap().is_empty());
        assert!(fake.events().iter().any(|e| e.reason == REASON_FINALIZED));
    }

    #[test]
    fn delete_server_error_retains_finalizer() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        mark_deleting(&fake, true);

        for status in [500u16, 502, 403] {
            *fake.fail_delete_with.lock().unwrap() = Some(status);
            let err = handler.sync("team-a/build").unwrap_err();
            assert!(matches!(err, SyncError::FinalizerRetained { .. }));
            assert!(fake.stored(&key()).unwrap().has_finalizer(PIPELINE_FINALIZER));
        }
        assert_eq!(*fake.writes.lock().unwrap(), 0);
        assert!(fake
            .events()
            .iter()
            .any(|e| e.reason == REASON_FAILED_DELETE && e.event_type == EventType::Warning));
    }

    #[test]
    fn deleting_without_finalizer_is_a_no_op() {
        let (fake, handler) = setup(Some(stored_pipeline(1)));
        mark_deleting(&fake, false);

        let outcome = handler.sync("team-a/build").expect("sync");
        assert_eq!(outcome.action, SyncAction::AlreadyFinalized);
        assert!(!outcome.persisted);
        assert!(fake.remote_calls().is_empty());
    }

    #[test]
    fn touched_remote_classification() {
        assert!(SyncAction::Created.touched_remote());
        assert!(SyncAction::Finalized.touched_remote());
        assert!(!SyncAction::UpToDate.touched_remote());
        assert!(!SyncAction::PipelineGone.touched_remote());
    }
}
