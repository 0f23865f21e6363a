use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinError;

use pipeline_core::store;
use pipeline_sync::{DirJobConfigClient, FileStore, SyncHandler};

use crate::cache::{list_and_resync, watch_store, HasSynced, StoreCache};
use crate::config::{ControllerConfig, LogFormat};
use crate::enqueue::Enqueuer;
use crate::error::{io_err, ControllerError};
use crate::events::EventBroadcaster;
use crate::queue::WorkQueue;

/// Per-worker counters, logged when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub synced: u64,
    pub failed: u64,
}

/// Worker pool bound to one queue and one handler.
pub struct Controller {
    queue: WorkQueue,
    handler: Arc<SyncHandler>,
    cache: Arc<dyn HasSynced>,
    events: EventBroadcaster,
    workers: usize,
    cache_sync_poll: Duration,
}

impl Controller {
    pub fn new(
        queue: WorkQueue,
        handler: Arc<SyncHandler>,
        cache: Arc<dyn HasSynced>,
        events: EventBroadcaster,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            cache,
            events,
            workers: config.workers(),
            cache_sync_poll: config.cache_sync_poll(),
        }
    }

    /// Wait for the cache to sync, then run workers until `stop` fires.
    ///
    /// Keys still pending when `stop` fires are drained before the workers
    /// exit. Returns the combined worker counters.
    pub async fn start(self, mut stop: broadcast::Receiver<()>) -> Result<WorkerStats, ControllerError> {
        tracing::info!("waiting for watch cache to sync");
        let mut poll = tokio::time::interval(self.cache_sync_poll);
        while !self.cache.has_synced() {
            tokio::select! {
                _ = stop.recv() => {
                    self.queue.shutdown();
                    self.events.shutdown();
                    return Err(ControllerError::CacheSyncAborted);
                }
                _ = poll.tick() => {}
            }
        }

        tracing::info!(workers = self.workers, "watch cache synced, starting workers");
        let handles: Vec<_> = (0..self.workers)
            .map(|id| tokio::spawn(run_worker(id, self.queue.clone(), self.handler.clone())))
            .collect();

        // A closed or lagged channel counts as a stop as well.
        let _ = stop.recv().await;
        tracing::info!("stop signal received, shutting down workers");
        self.queue.shutdown();

        let mut total = WorkerStats::default();
        let mut first_err = None;
        for (id, handle) in handles.into_iter().enumerate() {
            match handle_join(&format!("worker-{id}"), handle.await) {
                Ok(stats) => {
                    total.synced += stats.synced;
                    total.failed += stats.failed;
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        self.events.shutdown();

        match first_err {
            Some(err) => Err(err),
            None => {
                tracing::info!(synced = total.synced, failed = total.failed, "controller stopped");
                Ok(total)
            }
        }
    }
}

async fn run_worker(id: usize, queue: WorkQueue, handler: Arc<SyncHandler>) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Some(key) = queue.next().await {
        let sync_key = key.clone();
        let handler = handler.clone();
        let result = tokio::task::spawn_blocking(move || handler.sync(&sync_key)).await;

        match result {
            Ok(Ok(outcome)) => {
                queue.forget(&key);
                stats.synced += 1;
                tracing::debug!(
                    worker = id,
                    key = %key,
                    action = ?outcome.action,
                    persisted = outcome.persisted,
                    "sync succeeded",
                );
            }
            Ok(Err(err)) => {
                let delay = queue.retry_later(&key);
                stats.failed += 1;
                tracing::warn!(
                    worker = id,
                    key = %key,
                    error = %err,
                    conflict = err.is_conflict(),
                    retry_in_ms = delay.as_millis() as u64,
                    "sync failed, requeued",
                );
            }
            Err(err) => {
                let delay = queue.retry_later(&key);
                stats.failed += 1;
                tracing::error!(
                    worker = id,
                    key = %key,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "sync handler panicked, requeued",
                );
            }
        }
        queue.done(&key);
    }

    tracing::debug!(worker = id, synced = stats.synced, failed = stats.failed, "worker exiting");
    stats
}

// ---------------------------------------------------------------------------
// Local store wiring
// ---------------------------------------------------------------------------

/// Start the controller against the store at `root` and block the current
/// thread until ctrl-c. Returns the combined worker counters.
pub fn start_blocking(root: &Path, config: ControllerConfig) -> Result<WorkerStats, ControllerError> {
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    let root = root.to_path_buf();
    runtime.block_on(async move {
        let (shutdown_tx, _) = broadcast::channel::<()>(16);

        let signal_handle = {
            let shutdown = shutdown_tx.clone();
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown_rx.recv() => Ok(()),
                    signal = tokio::signal::ctrl_c() => match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down controller");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(ControllerError::Signal(err.to_string())),
                    },
                }
            })
        };

        let result = run_local(root, config, shutdown_tx.clone()).await;
        let _ = shutdown_tx.send(());
        handle_join("signal_handler", signal_handle.await)??;
        let stats = result?;
        tracing::info!(synced = stats.synced, failed = stats.failed, "controller exited");
        Ok(stats)
    })
}

/// Run cache, watcher, resync and workers over the file-backed store until
/// `shutdown` fires. Any task exiting stops the others.
pub async fn run_local(
    root: PathBuf,
    config: ControllerConfig,
    shutdown: broadcast::Sender<()>,
) -> Result<WorkerStats, ControllerError> {
    let namespaces = store::namespaces_dir_at(&root);
    if !namespaces.exists() {
        fs::create_dir_all(&namespaces).map_err(|e| io_err(&namespaces, e))?;
    }
    tracing::info!(root = %root.display(), workers = config.workers(), "starting controller");

    let cache = Arc::new(StoreCache::new(&root));
    let queue = WorkQueue::with_bucket(config.backoff(), config.token_bucket());
    let enqueuer = Enqueuer::new(queue.clone());
    let events = EventBroadcaster::new(config.event_capacity);

    let handler = SyncHandler::new(
        cache.clone(),
        cache.clone(),
        Arc::new(DirJobConfigClient::new(&root)),
        Arc::new(FileStore::new(&root)),
        events.recorder(),
    )
    .with_ineligible_policy(config.ineligible_namespace_policy);
    let controller = Controller::new(queue, Arc::new(handler), cache.clone(), events, &config);

    let watcher_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let (cache, enqueuer) = (cache.clone(), enqueuer.clone());
        tokio::spawn(async move {
            let result = watch_store(cache, enqueuer, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let lister_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let retry = config.cache_sync_poll();
        let resync = config.resync_interval();
        tokio::spawn(async move {
            let result = list_and_resync(cache, enqueuer, retry, resync, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let controller_handle = {
        let shutdown = shutdown.clone();
        let stop = shutdown.subscribe();
        tokio::spawn(async move {
            let result = controller.start(stop).await;
            let _ = shutdown.send(());
            result
        })
    };

    let (watcher_result, lister_result, controller_result) =
        tokio::join!(watcher_handle, lister_handle, controller_handle);

    handle_join("watcher", watcher_result)??;
    handle_join("lister", lister_result)??;
    handle_join("controller", controller_result)?
}

fn handle_join<T>(task: &str, result: Result<T, JoinError>) -> Result<T, ControllerError> {
    result.map_err(|err| ControllerError::Join {
        task: task.to_string(),
        message: err.to_string(),
    })
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter; records from the `log` facade are bridged in.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
