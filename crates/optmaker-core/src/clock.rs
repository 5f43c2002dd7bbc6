//! Injectable time source.
//!
//! Caches compare observation timestamps against `Clock::now_ms()` at read
//! time. Tests drive a `ManualClock` to cross staleness thresholds exactly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    /// Returns current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> i64;

    /// Returns current time in whole seconds since Unix epoch.
    fn now_secs(&self) -> i64 {
        self.now_ms() / 1000
    }
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for tests and replay.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(500);
        assert_eq!(other.now_ms(), 1_500);
        assert_eq!(other.now_secs(), 1);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2023-11-14 in ms
        assert!(SystemClock.now_ms() > 1_700_000_000_000);
    }
}
