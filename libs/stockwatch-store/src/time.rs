//! Time provider abstraction
//!
//! Rate limiting windows, heartbeat staleness and alert timestamps all read
//! "now" through [`TimeProvider`] so tests can pin or advance the clock.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub trait TimeProvider: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since Unix epoch
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed time provider for testing
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeProvider {
    at: DateTime<Utc>,
}

impl FixedTimeProvider {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Test clock that only moves when told to
#[derive(Debug)]
pub struct ManualTimeProvider {
    at: Mutex<DateTime<Utc>>,
}

impl ManualTimeProvider {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn advance(&self, by: Duration) {
        let mut at = self.at.lock();
        *at += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.at.lock() = to;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock()
    }
}
