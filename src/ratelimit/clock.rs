//! Monotonic time sources for bucket accounting.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, TollgateError};

/// A source of monotonically non-decreasing timestamps.
///
/// Wall-clock time is never used: adjustments to it would produce negative
/// elapsed time between refills.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually driven clock for tests and deterministic simulation.
///
/// Clones share the same underlying time, so a clone handed to a store can
/// be advanced from the outside.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<Instant>>,
}

impl ManualClock {
    /// Create a manual clock starting at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a manual clock starting at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write();
        *current += duration;
    }

    /// Jump the clock to `instant`.
    ///
    /// Fails if `instant` lies before the current time.
    pub fn set(&self, instant: Instant) -> Result<()> {
        let mut current = self.current.write();
        if instant < *current {
            return Err(TollgateError::Clock(format!(
                "cannot move clock backwards by {:?}",
                *current - instant
            )));
        }
        *current = instant;
        Ok(())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.read()
    }
}
