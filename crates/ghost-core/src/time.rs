//! Clock abstraction for testable timing.
//!
//! The engine compares `execute_at` stamps against the current wall clock on
//! every heartbeat pass. Injecting the clock lets tests pin or skew "now"
//! without sleeping through real schedules.

use std::{future::Future, pin::Pin, time::Duration};

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
///
/// Production code uses [`SystemClock`]; tests can supply a fixed or
/// offset implementation.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleeps for the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock backed by the system time and tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
