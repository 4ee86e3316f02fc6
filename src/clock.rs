use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Defines how an engine component determines the current time.
///
/// Generally components use a:
/// * [`LiveClock`] for live-trading & paper-trading.
/// * [`SimulatedClock`] for back-testing & replay.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Live `Clock` using `Utc::now()`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct LiveClock;

impl Clock for LiveClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated `Clock` holding a single shared "now" instant.
///
/// Clones share the same instant, so an executor and a market data feed
/// constructed from the same `SimulatedClock` observe identical time. Only the
/// replay driver should call [`SimulatedClock::advance_to`], which enforces
/// monotonicity; [`SimulatedClock::reset`] bypasses the check for test setup.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    inner: Arc<parking_lot::RwLock<DateTime<Utc>>>,
}

impl SimulatedClock {
    /// Construct a new `SimulatedClock` seeded with the provided instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(parking_lot::RwLock::new(start)),
        }
    }

    /// Advance the shared instant. Time must not move backwards.
    pub fn advance_to(&self, time: DateTime<Utc>) -> Result<(), ClockError> {
        let mut now = self.inner.write();
        if time < *now {
            return Err(ClockError::BackwardsTime {
                current: *now,
                requested: time,
            });
        }
        *now = time;
        Ok(())
    }

    /// Re-seed the shared instant unconditionally. Test-only escape hatch.
    pub fn reset(&self, time: DateTime<Utc>) {
        *self.inner.write() = time;
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.read()
    }
}

/// Clock specific errors.
#[derive(Debug, Copy, Clone, PartialEq, Error)]
pub enum ClockError {
    #[error("clock cannot move backwards: current={current}, requested={requested}")]
    BackwardsTime {
        current: DateTime<Utc>,
        requested: DateTime<Utc>,
    },
}
