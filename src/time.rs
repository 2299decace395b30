//! Time source module
//!
//! Monotonic microsecond timestamps used for peer first/last-seen tracking
//! and bandwidth sampling.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Number of microseconds in one second
pub const USECS_PER_SECOND: u64 = 1_000_000;

/// Abstraction over a time source to improve testability.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Returns the current monotonic timestamp in microseconds.
    fn now_usecs(&self) -> u64;
}

/// Process-wide monotonic clock.
///
/// Timestamps count microseconds since the first time any `SystemClock`
/// was read in this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_usecs(&self) -> u64 {
        usec_timestamp_now()
    }
}

/// Current monotonic timestamp in microseconds
pub fn usec_timestamp_now() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}

/// Shared clock handle used by records and tables
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Hand-driven clock for tests and simulations.
///
/// Clones share the same underlying time, so advancing one handle is
/// visible through every record holding another.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock starting at the given timestamp
    pub fn new(start_usecs: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_usecs)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute timestamp
    pub fn set(&self, usecs: u64) {
        self.now.store(usecs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_usecs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
