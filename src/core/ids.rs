// Monotonic, time-derived identifiers.
//
// Ids are the millisecond timestamp of creation, bumped by one whenever two ids
// would otherwise collide, so they sort in creation order within one context.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> u64 {
        let candidate = now.timestamp_millis().max(0) as u64;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Make every later id larger than `id`, which another context has already taken.
    pub fn observe(&self, id: u64) {
        self.last.fetch_max(id, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_strictly_increasing_for_the_same_instant() {
        let ids = IdGenerator::new();
        let now = Utc::now();

        let first = ids.next(now);
        let second = ids.next(now);
        let third = ids.next(now);

        assert_eq!(first, now.timestamp_millis() as u64);
        assert_eq!(second, first + 1);
        assert_eq!(third, first + 2);
    }

    #[test]
    fn test_ids_follow_the_clock_when_it_moves_ahead() {
        let ids = IdGenerator::new();
        let now = Utc::now();

        ids.next(now);
        let later = now + chrono::Duration::seconds(1);

        assert_eq!(ids.next(later), later.timestamp_millis() as u64);
    }

    #[test]
    fn test_observed_ids_are_skipped() {
        let ids = IdGenerator::new();
        let now = Utc::now();
        let taken = now.timestamp_millis() as u64 + 5;

        ids.observe(taken);

        assert_eq!(ids.next(now), taken + 1);
    }
}
