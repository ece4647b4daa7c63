//! Lock-free counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts calls and reports once the count has passed a threshold.
#[derive(Debug)]
pub struct Counter {
    threshold: u64,
    count: AtomicU64,
}

impl Counter {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            count: AtomicU64::new(0),
        }
    }

    /// Record one call. Returns true if this call lands past the threshold.
    pub fn tick(&self) -> bool {
        self.count.fetch_add(1, Ordering::AcqRel) + 1 > self.threshold
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_passes_threshold_once_exceeded() {
        let counter = Counter::new(2);

        assert!(!counter.tick());
        assert!(!counter.tick());
        assert!(counter.tick());
        assert!(counter.tick());
        assert_eq!(counter.count(), 4);
    }
}
