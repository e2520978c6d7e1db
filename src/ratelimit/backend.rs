//! Rate limiter trait for abstracting admission backends.

use async_trait::async_trait;

use super::bucket::Decision;
use super::clock::Clock;
use super::store::KeyedLimiterStore;

/// Trait for admission backends.
///
/// The gRPC adapter works against this capability rather than a concrete
/// store, so a backend sharing counters outside the process can be swapped
/// in without changing the adapter.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Consume one unit of `key`'s allowance and report the decision.
    async fn check(&self, key: &str) -> Decision;

    /// Whether a request for `key` is admitted.
    async fn allow(&self, key: &str) -> bool {
        self.check(key).await.allowed
    }
}

#[async_trait]
impl<C: Clock + 'static> RateLimitBackend for KeyedLimiterStore<C> {
    async fn check(&self, key: &str) -> Decision {
        KeyedLimiterStore::check(self, key)
    }
}
