//! Token bucket rate limiting and per-key state management.

mod backend;
mod bucket;
mod clock;
mod store;

pub use backend::RateLimitBackend;
pub use bucket::{Decision, LimiterConfig, TokenBucket};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use store::{spawn_idle_sweeper, KeyedLimiterStore};
