//! Keyed bucket storage.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::bucket::{Decision, LimiterConfig, TokenBucket};
use super::clock::{Clock, MonotonicClock};

/// In-memory limiter that keeps one [`TokenBucket`] per key.
///
/// Buckets live in a sharded map. A decision holds the write lock of the
/// key's shard for the whole refill-and-take step, so calls for the same key
/// are linearized while calls for keys in other shards proceed in parallel.
/// The critical section does no I/O and constant work.
///
/// Buckets are created full on the first request for a key and retained
/// until [`evict_idle`](Self::evict_idle) or [`clear`](Self::clear) removes
/// them.
pub struct KeyedLimiterStore<C: Clock = MonotonicClock> {
    /// Buckets indexed by caller key
    buckets: DashMap<String, TokenBucket>,
    /// Parameters shared by every bucket
    config: LimiterConfig,
    /// Time source for refills
    clock: C,
}

impl KeyedLimiterStore<MonotonicClock> {
    /// Create a store using the process monotonic clock.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, MonotonicClock)
    }
}

impl<C: Clock> KeyedLimiterStore<C> {
    /// Create a store driven by `clock`.
    pub fn with_clock(config: LimiterConfig, clock: C) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
            clock,
        }
    }

    /// Consume one token for `key`, returning whether the request is admitted.
    ///
    /// Any string, including the empty string, is a distinct key.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Consume one token for `key` and report the full decision.
    pub fn check(&self, key: &str) -> Decision {
        let decision = match self.buckets.get_mut(key) {
            Some(mut bucket) => bucket.refill_and_take(self.clock.now(), &self.config),
            None => {
                let mut bucket = self.buckets.entry(key.to_owned()).or_insert_with(|| {
                    debug!(
                        key = %key,
                        capacity = self.config.capacity(),
                        refill_rate = self.config.refill_rate(),
                        "Creating new token bucket"
                    );
                    TokenBucket::full(&self.config, self.clock.now())
                });
                bucket.refill_and_take(self.clock.now(), &self.config)
            }
        };

        trace!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Checked token bucket"
        );

        if !decision.allowed {
            debug!(
                key = %key,
                retry_after_ms = saturating_millis(decision.retry_after),
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Token level `key` would have right now, without consuming anything.
    ///
    /// Returns `None` if no bucket exists for the key.
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets
            .get(key)
            .map(|bucket| bucket.level_at(self.clock.now(), &self.config))
    }

    /// Remove buckets that have been idle for at least `min_idle` and have
    /// refilled to capacity.
    ///
    /// A removed bucket is indistinguishable from the full bucket that would
    /// be created on the key's next request, so eviction never changes a
    /// decision. Returns the number of buckets removed.
    pub fn evict_idle(&self, min_idle: Duration) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| {
            let idle = now.saturating_duration_since(bucket.last_refill());
            idle < min_idle.max(self.config.time_to_full(bucket.tokens()))
        });

        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.buckets.len(), "Evicted idle buckets");
        }
        evicted
    }

    /// The limiter parameters.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop all buckets.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Periodically evict idle buckets from `store`.
///
/// The first sweep runs one `period` after spawning. The task runs until
/// aborted.
pub fn spawn_idle_sweeper<C: Clock + 'static>(
    store: Arc<KeyedLimiterStore<C>>,
    idle_ttl: Duration,
    period: Duration,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_secs(1));
    info!(idle_ttl = ?idle_ttl, interval = ?period, "Starting idle bucket sweeper");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = store.evict_idle(idle_ttl);
            info!(evicted = evicted, tracked = store.len(), "Idle bucket sweep complete");
        }
    })
}
