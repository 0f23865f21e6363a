//! Dedup retry queue.
//!
//! A key lives in at most one of three places: `queue` (pending, in FIFO
//! order), `processing` (checked out by a worker), or nowhere. `dirty` marks
//! keys that must be (re)processed; a dirty key that is also processing is
//! parked until [`WorkQueue::done`] releases it, which is what keeps a key on
//! a single worker at a time.
//!
//! Retries are delayed by the larger of two limits: a per-key exponential
//! [`Backoff`] and a [`TokenBucket`] shared by every key, which caps the
//! aggregate retry rate when many keys fail at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::Notify;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(5);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(1000);
pub const DEFAULT_RETRY_QPS: u32 = 10;
pub const DEFAULT_RETRY_BURST: u32 = 100;

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl Backoff {
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

// ---------------------------------------------------------------------------
// Overall limit
// ---------------------------------------------------------------------------

/// Token bucket shared by all keys: `qps` retries per second after an
/// initial `burst`.
pub struct TokenBucket<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    clock: C,
}

impl TokenBucket {
    pub fn new(qps: u32, burst: u32) -> Self {
        Self::with_clock(qps, burst, DefaultClock::default())
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_QPS, DEFAULT_RETRY_BURST)
    }
}

impl<C: Clock> TokenBucket<C> {
    pub fn with_clock(qps: u32, burst: u32, clock: C) -> Self {
        let qps = NonZeroU32::new(qps).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(qps).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct_with_clock(quota, &clock),
            clock,
        }
    }

    /// Take a token. When the bucket is empty, returns how long until the
    /// next one is available.
    pub fn delay(&self) -> Duration {
        match self.limiter.check() {
            Ok(()) => Duration::ZERO,
            Err(not_until) => not_until.wait_time_from(self.clock.now()),
        }
    }
}

trait RetryLimit: Send + Sync {
    fn delay(&self) -> Duration;
}

impl<C> RetryLimit for TokenBucket<C>
where
    C: Clock + Send + Sync,
{
    fn delay(&self) -> Duration {
        TokenBucket::<C>::delay(self)
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

struct Inner {
    state: Mutex<State>,
    ready: Notify,
    backoff: Backoff,
    bucket: Box<dyn RetryLimit>,
}

/// Cloneable handle; all clones share one queue.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

impl WorkQueue {
    /// Queue with the given per-key backoff and the default overall bucket.
    pub fn new(backoff: Backoff) -> Self {
        Self::with_bucket(backoff, TokenBucket::default())
    }

    pub fn with_bucket<C>(backoff: Backoff, bucket: TokenBucket<C>) -> Self
    where
        C: Clock + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                ready: Notify::new(),
                backoff,
                bucket: Box::new(bucket),
            }),
        }
    }

    /// Schedule `key`. Duplicates of a pending key merge; a key that is
    /// currently processing is parked until `done`.
    pub fn add(&self, key: &str) {
        let mut state = self.lock();
        if state.shutting_down || !state.dirty.insert(key.to_string()) {
            return;
        }
        if state.processing.contains(key) {
            return;
        }
        state.queue.push_back(key.to_string());
        drop(state);
        self.inner.ready.notify_one();
    }

    /// Wait for the next key and check it out.
    ///
    /// Returns `None` once the queue is shut down and has no pending keys.
    /// Keys still pending at shutdown are handed out first.
    pub async fn next(&self) -> Option<String> {
        loop {
            let notified = self.inner.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release a checked-out key, requeueing it if it was re-added meanwhile.
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.inner.ready.notify_one();
        }
    }

    /// Clear the failure history of `key`.
    pub fn forget(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    /// Re-add `key` after the larger of its backoff delay and the overall
    /// bucket's delay, and record one more failure. Returns the delay used.
    pub fn retry_later(&self, key: &str) -> Duration {
        let per_key = {
            let mut state = self.lock();
            if state.shutting_down {
                return Duration::ZERO;
            }
            let failures = state.failures.entry(key.to_string()).or_insert(0);
            let delay = self.inner.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        let delay = per_key.max(self.inner.bucket.delay());

        let queue = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
        delay
    }

    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Number of pending keys, not counting keys being processed.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every waiting `next`.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.inner.ready.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
