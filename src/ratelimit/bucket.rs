//! Token bucket accounting.
//!
//! A bucket holds up to `capacity` tokens and is refilled continuously at
//! `refill_rate` tokens per second. Each admitted request consumes one token;
//! requests are rejected while fewer than one token is available.
//!
//! The accounting here is a plain function of `(bucket, now, config)` and
//! carries no synchronization. Sharing buckets between callers is the job of
//! [`KeyedLimiterStore`](super::KeyedLimiterStore).

use std::time::{Duration, Instant};

use crate::error::{Result, TollgateError};

/// Immutable limiter parameters shared by every bucket of a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    capacity: u32,
    refill_rate: f64,
}

impl LimiterConfig {
    /// Create a configuration from a burst capacity and a refill rate in
    /// tokens per second.
    pub fn new(capacity: u32, refill_rate: f64) -> Result<Self> {
        if capacity == 0 {
            return Err(TollgateError::Config(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(TollgateError::Config(format!(
                "refill rate must be a positive number of tokens per second, got {}",
                refill_rate
            )));
        }
        Ok(Self {
            capacity,
            refill_rate,
        })
    }

    /// Allow `requests` per `window`, with a burst of `requests`.
    pub fn per_window(requests: u32, window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(TollgateError::Config(
                "window must be non-zero".to_string(),
            ));
        }
        Self::from_requests(requests, window.as_secs_f64())
    }

    /// Allow `requests` per `per_seconds` seconds, with a burst of `requests`.
    pub fn from_requests(requests: u32, per_seconds: f64) -> Result<Self> {
        if !per_seconds.is_finite() || per_seconds <= 0.0 {
            return Err(TollgateError::Config(format!(
                "window must be a positive number of seconds, got {}",
                per_seconds
            )));
        }
        Self::new(requests, requests as f64 / per_seconds)
    }

    /// Maximum burst size.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Time for a bucket holding `tokens` to refill completely.
    pub fn time_to_full(&self, tokens: f64) -> Duration {
        let missing = (self.capacity as f64 - tokens).max(0.0);
        saturating_secs(missing / self.refill_rate)
    }
}

/// Convert seconds to a `Duration`, saturating at `Duration::MAX` for tiny
/// refill rates.
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Outcome of a single accounting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Whole tokens left after this decision
    pub remaining: u32,
    /// Time until the next token is available; zero when admitted
    pub retry_after: Duration,
}

/// Per-key bucket state.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket holding `capacity` tokens as of `now`.
    pub fn full(config: &LimiterConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity as f64,
            last_refill: now,
        }
    }

    /// Current token level as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// When the bucket was last refilled.
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// The token level this bucket would have at `now`, without mutating it.
    pub fn level_at(&self, now: Instant, config: &LimiterConfig) -> f64 {
        // An earlier `now` is clamped to zero elapsed time.
        let elapsed = now.saturating_duration_since(self.last_refill);
        (self.tokens + elapsed.as_secs_f64() * config.refill_rate).min(config.capacity as f64)
    }

    /// Refill the bucket up to `now` and try to take one token.
    ///
    /// The refill timestamp advances on both admission and rejection, so
    /// fractional accrual carries over to the next call exactly once.
    pub fn refill_and_take(&mut self, now: Instant, config: &LimiterConfig) -> Decision {
        self.tokens = self.level_at(now, config);
        self.last_refill = self.last_refill.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Decision {
                allowed: true,
                remaining: self.tokens.floor() as u32,
                retry_after: Duration::ZERO,
            }
        } else {
            Decision {
                allowed: false,
                remaining: 0,
                retry_after: saturating_secs((1.0 - self.tokens) / config.refill_rate),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: u32, refill_rate: f64) -> LimiterConfig {
        LimiterConfig::new(capacity, refill_rate).unwrap()
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let result = LimiterConfig::new(0, 1.0);
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_config_rejects_non_positive_rate() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = LimiterConfig::new(5, rate);
            assert!(
                matches!(result, Err(TollgateError::Config(_))),
                "rate {} should be rejected",
                rate
            );
        }
    }

    #[test]
    fn test_config_from_requests_derives_rate() {
        let config = LimiterConfig::from_requests(10, 5.0).unwrap();
        assert_eq!(config.capacity(), 10);
        assert_eq!(config.refill_rate(), 2.0);

        assert!(LimiterConfig::from_requests(10, 0.0).is_err());
        assert!(LimiterConfig::from_requests(0, 5.0).is_err());
    }

    #[test]
    fn test_config_per_window() {
        let config = LimiterConfig::per_window(120, Duration::from_secs(60)).unwrap();
        assert_eq!(config.capacity(), 120);
        assert_eq!(config.refill_rate(), 2.0);

        assert!(LimiterConfig::per_window(10, Duration::ZERO).is_err());
    }

    #[test]
    fn test_time_to_full() {
        let config = config(4, 2.0);
        assert_eq!(config.time_to_full(0.0), Duration::from_secs(2));
        assert_eq!(config.time_to_full(4.0), Duration::ZERO);
    }

    #[test]
    fn test_tiny_rate_saturates_time_to_full() {
        let config = config(1, 1e-20);
        assert_eq!(config.time_to_full(0.0), Duration::MAX);
        assert_eq!(config.time_to_full(1.0), Duration::ZERO);
    }

    #[test]
    fn test_tiny_rate_saturates_retry_after() {
        let config = LimiterConfig::from_requests(1, 1e20).unwrap();
        let now = Instant::now();
        let mut bucket = TokenBucket::full(&config, now);

        assert!(bucket.refill_and_take(now, &config).allowed);

        let decision = bucket.refill_and_take(now, &config);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Duration::MAX);
    }

    #[test]
    fn test_burst_then_reject() {
        let config = config(5, 0.001);
        let now = Instant::now();
        let mut bucket = TokenBucket::full(&config, now);

        for expected_remaining in (0..5).rev() {
            let decision = bucket.refill_and_take(now, &config);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = bucket.refill_and_take(now, &config);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_refill_after_one_second() {
        let config = config(1, 1.0);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(&config, start);

        assert!(bucket.refill_and_take(start, &config).allowed);
        assert!(!bucket.refill_and_take(start, &config).allowed);
        assert!(bucket
            .refill_and_take(start + Duration::from_secs(1), &config)
            .allowed);
    }

    #[test]
    fn test_rejected_calls_keep_partial_accrual() {
        let config = config(1, 1.0);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(&config, start);
        assert!(bucket.refill_and_take(start, &config).allowed);

        // Two rejected half-second steps add up to one full token.
        let half = Duration::from_millis(500);
        assert!(!bucket.refill_and_take(start + half, &config).allowed);
        assert_eq!(bucket.tokens(), 0.5);
        assert_eq!(bucket.last_refill(), start + half);
        assert!(bucket.refill_and_take(start + half * 2, &config).allowed);
    }

    #[test]
    fn test_retry_after_reports_time_to_next_token() {
        let config = config(1, 4.0);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(&config, start);
        bucket.refill_and_take(start, &config);

        let decision = bucket.refill_and_take(start, &config);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Duration::from_millis(250));

        let decision = bucket.refill_and_take(start + Duration::from_millis(250), &config);
        assert!(decision.allowed);
        assert_eq!(decision.retry_after, Duration::ZERO);
    }

    #[test]
    fn test_idle_bucket_saturates_at_capacity() {
        let config = config(3, 1.0);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(&config, start);

        // Idle for 100 windows.
        let later = start + Duration::from_secs(300);
        assert_eq!(bucket.level_at(later, &config), 3.0);

        for _ in 0..3 {
            assert!(bucket.refill_and_take(later, &config).allowed);
        }
        assert!(!bucket.refill_and_take(later, &config).allowed);
    }

    #[test]
    fn test_earlier_timestamp_clamps_elapsed_to_zero() {
        let config = config(2, 1.0);
        let start = Instant::now() + Duration::from_secs(10);
        let mut bucket = TokenBucket::full(&config, start);
        bucket.refill_and_take(start, &config);
        bucket.refill_and_take(start, &config);

        let earlier = start - Duration::from_secs(5);
        let decision = bucket.refill_and_take(earlier, &config);
        assert!(!decision.allowed);
        assert_eq!(bucket.tokens(), 0.0);
        assert_eq!(bucket.last_refill(), start);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let config = config(4, 3.0);
        let mut now = Instant::now();
        let mut bucket = TokenBucket::full(&config, now);

        // Irregular, non-decreasing steps between 0 and ~0.9s.
        for i in 0..500u64 {
            now += Duration::from_millis((i * 37) % 911);
            bucket.refill_and_take(now, &config);
            assert!(bucket.tokens() >= 0.0);
            assert!(bucket.tokens() <= config.capacity() as f64);
        }
    }

    #[test]
    fn test_admissions_respect_burst_bound() {
        let config = config(5, 2.0);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(&config, start);

        // Offer a request every 10ms for 10 seconds.
        let mut admitted = 0u32;
        for step in 0..=1000u64 {
            let now = start + Duration::from_millis(step * 10);
            if bucket.refill_and_take(now, &config).allowed {
                admitted += 1;
            }
        }

        // capacity + T * refill_rate
        assert!(admitted <= 5 + 20);
        assert!(admitted >= 5 + 19);
    }
}
