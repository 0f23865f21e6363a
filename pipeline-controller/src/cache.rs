//! Watch cache over the file-backed store.
//!
//! [`StoreCache`] keeps the last observed namespaces and pipelines in memory
//! and serves the sync handler's point reads. Two tasks keep it current:
//! [`watch_store`] reloads single paths on filesystem notifications and
//! [`list_and_resync`] performs the initial listing plus periodic relists.
//! Both hand the resulting [`WatchEvent`]s to the [`Enqueuer`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use pipeline_core::{
    store::{self, StorePath},
    Namespace, ObjectKey, Pipeline, StoreError,
};
use pipeline_sync::{NamespaceLister, PipelineLister};

use crate::enqueue::{DeletedObject, Enqueuer, WatchEvent};
use crate::error::{io_err, ControllerError};

/// Reports whether the initial listing has completed.
pub trait HasSynced: Send + Sync {
    fn has_synced(&self) -> bool;
}

pub struct StoreCache {
    root: PathBuf,
    /// Held by `relist` and `reload` from the store read until the maps are
    /// updated, so a listing never overwrites a newer single-path refresh.
    refresh: Mutex<()>,
    namespaces: RwLock<HashMap<String, Namespace>>,
    pipelines: RwLock<BTreeMap<ObjectKey, Pipeline>>,
    synced: AtomicBool,
}

impl StoreCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            refresh: Mutex::new(()),
            namespaces: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(BTreeMap::new()),
            synced: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace the cache contents with a full listing of the store.
    ///
    /// The first listing reports every pipeline as `Added`. Later listings
    /// report survivors as `Updated` (old and new may be identical), new
    /// pipelines as `Added` and vanished ones as `Deleted`.
    pub fn relist(&self) -> Result<Vec<WatchEvent>, ControllerError> {
        let _refresh = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let namespaces = store::list_namespaces_at(&self.root)?;
        let pipelines = store::list_pipelines_at(&self.root)?;
        let initial = !self.has_synced();

        *write(&self.namespaces) = namespaces
            .into_iter()
            .map(|ns| (ns.name().to_string(), ns))
            .collect();

        let mut events = Vec::with_capacity(pipelines.len());
        {
            let mut cached = write(&self.pipelines);
            let mut previous = std::mem::take(&mut *cached);
            for pipeline in pipelines {
                let key = pipeline.key();
                let event = match previous.remove(&key) {
                    Some(old) if !initial => WatchEvent::Updated {
                        old,
                        new: pipeline.clone(),
                    },
                    _ => WatchEvent::Added(pipeline.clone()),
                };
                cached.insert(key, pipeline);
                events.push(event);
            }
            if !initial {
                events.extend(
                    previous
                        .into_values()
                        .map(|old| WatchEvent::Deleted(DeletedObject::Known(old))),
                );
            }
        }

        self.synced.store(true, Ordering::Release);
        Ok(events)
    }

    /// Refresh whatever `path` stores. Namespace changes only update the
    /// cache; pipeline changes also produce the matching event.
    pub fn reload(&self, path: &Path) -> Result<Option<WatchEvent>, ControllerError> {
        let _refresh = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        match store::classify_path(&self.root, path) {
            Some(StorePath::Namespace(name)) => {
                let mut namespaces = write(&self.namespaces);
                match store::load_namespace_at(&self.root, &name)? {
                    Some(ns) => namespaces.insert(name, ns),
                    None => namespaces.remove(&name),
                };
                Ok(None)
            }
            Some(StorePath::Pipeline(key)) => {
                let loaded = store::load_pipeline_at(&self.root, &key)?;
                let mut pipelines = write(&self.pipelines);
                let event = match loaded {
                    Some(new) => match pipelines.insert(key, new.clone()) {
                        Some(old) => WatchEvent::Updated { old, new },
                        None => WatchEvent::Added(new),
                    },
                    None => match pipelines.remove(&key) {
                        Some(old) => WatchEvent::Deleted(DeletedObject::Known(old)),
                        None => return Ok(None),
                    },
                };
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    /// Snapshot of cached pipelines, sorted by key.
    pub fn pipelines(&self) -> Vec<Pipeline> {
        read(&self.pipelines).values().cloned().collect()
    }
}

impl HasSynced for StoreCache {
    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

impl NamespaceLister for StoreCache {
    fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        Ok(read(&self.namespaces).get(name).cloned())
    }
}

impl PipelineLister for StoreCache {
    fn get_pipeline(&self, key: &ObjectKey) -> Result<Option<Pipeline>, StoreError> {
        Ok(read(&self.pipelines).get(key).cloned())
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Watch `<root>/namespaces` recursively and feed every change through
/// [`StoreCache::reload`] into the enqueuer.
pub async fn watch_store(
    cache: Arc<StoreCache>,
    enqueuer: Enqueuer,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ControllerError> {
    let namespaces = store::namespaces_dir_at(cache.root());
    if !namespaces.exists() {
        fs::create_dir_all(&namespaces).map_err(|e| io_err(&namespaces, e))?;
    }

    // Notifications may arrive with the real path (e.g. /private/var/... on
    // macOS), so watch the canonical directory and map paths back.
    let watched = fs::canonicalize(&namespaces).unwrap_or_else(|_| namespaces.clone());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&watched, RecursiveMode::Recursive)?;
    tracing::debug!(path = %watched.display(), "watching store");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    let Some(path) = rebase(&path, &watched, &namespaces) else {
                        continue;
                    };
                    let cache = cache.clone();
                    let reloaded = tokio::task::spawn_blocking(move || {
                        let result = cache.reload(&path);
                        (path, result)
                    })
                    .await;
                    match reloaded {
                        Ok((_, Ok(Some(event)))) => enqueuer.handle(event),
                        Ok((_, Ok(None))) => {}
                        Ok((path, Err(err))) => {
                            tracing::warn!(path = %path.display(), error = %err, "reload failed");
                        }
                        Err(err) => {
                            return Err(ControllerError::Join {
                                task: "cache reload".to_string(),
                                message: err.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Run the initial listing (retrying every `retry` until it succeeds), then
/// relist every `resync` if set.
pub async fn list_and_resync(
    cache: Arc<StoreCache>,
    enqueuer: Enqueuer,
    retry: Duration,
    resync: Option<Duration>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ControllerError> {
    loop {
        match relist_into(&cache, &enqueuer).await {
            Ok(count) => {
                tracing::info!(pipelines = count, "initial listing complete");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "initial listing failed, retrying");
                tokio::select! {
                    _ = shutdown_rx.recv() => return Ok(()),
                    _ = tokio::time::sleep(retry) => {}
                }
            }
        }
    }

    let Some(resync) = resync else {
        let _ = shutdown_rx.recv().await;
        return Ok(());
    };

    let mut interval = tokio::time::interval(resync);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                if let Err(err) = relist_into(&cache, &enqueuer).await {
                    tracing::warn!(error = %err, "resync failed");
                }
            }
        }
    }
    Ok(())
}

/// Relist on the blocking pool and enqueue the result. Returns the number of
/// cached pipelines.
pub async fn relist_into(cache: &Arc<StoreCache>, enqueuer: &Enqueuer) -> Result<usize, ControllerError> {
    let cache = cache.clone();
    let events = tokio::task::spawn_blocking(move || cache.relist())
        .await
        .map_err(|err| ControllerError::Join {
            task: "relist".to_string(),
            message: err.to_string(),
        })??;
    let count = events
        .iter()
        .filter(|event| !matches!(event, WatchEvent::Deleted(_)))
        .count();
    for event in events {
        enqueuer.handle(event);
    }
    Ok(count)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn rebase(path: &Path, watched: &Path, namespaces: &Path) -> Option<PathBuf> {
    path.strip_prefix(watched)
        .ok()
        .map(|relative| namespaces.join(relative))
}
