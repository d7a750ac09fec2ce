use super::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Source of write timestamps. Every call returns a value strictly greater
/// than the previous one so that a delete followed by a rewrite of the same
/// row is never lost to a timestamp tie.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

fn fetch_monotonic(last: &AtomicU64, candidate: u64) -> u64 {
    let mut current = last.load(Ordering::SeqCst);
    loop {
        let next = candidate.max(current + 1);
        match last.compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

#[derive(Default)]
pub struct SystemClock {
    last_nanos: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d,
            Err(e) => {
                warn!("System time is before UNIX epoch: {:?}", e);
                Duration::ZERO
            }
        };
        let nanos = fetch_monotonic(&self.last_nanos, wall.as_nanos() as u64);
        Timestamp::from_nanos(nanos as u128)
    }
}

/// Deterministic clock for tests: ticks one microsecond per call and only
/// jumps further when advanced explicitly.
pub struct ManualClock {
    nanos: AtomicU64,
}

const MANUAL_TICK_NANOS: u64 = 1_000;

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos() as u64),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp {
            seconds: 1_700_000_000,
            nanoseconds: 0,
        })
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let nanos = self.nanos.fetch_add(MANUAL_TICK_NANOS, Ordering::SeqCst);
        Timestamp::from_nanos(nanos as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_strictly_monotonic() {
        let clock = SystemClock::new();
        let mut previous = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::default();
        let first = clock.now();
        clock.advance(Duration::from_secs(60));
        let second = clock.now();
        assert!(second.seconds >= first.seconds + 60);
    }
}
