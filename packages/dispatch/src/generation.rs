//! Run generations for discarding superseded results.
//!
//! Every run for a key takes a fresh [`Generation`]. Starting a new run
//! makes all earlier generations for that key stale; a finished run checks
//! [`GenerationTracker::is_current`] before publishing its result.
//! In-flight workers are not aborted.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Identity of one run for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Sequence number; later runs have larger numbers.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Latest generation per key.
#[derive(Debug)]
pub struct GenerationTracker<K> {
    latest: Mutex<BTreeMap<K, u64>>,
}

impl<K> Default for GenerationTracker<K> {
    fn default() -> Self {
        Self {
            latest: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone> GenerationTracker<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run for `key`, superseding any earlier run.
    pub fn begin(&self, key: &K) -> Generation {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let next = latest.get(key).map_or(1, |g| g + 1);
        latest.insert(key.clone(), next);
        Generation(next)
    }

    /// Whether `generation` is still the latest run for `key`.
    #[must_use]
    pub fn is_current(&self, key: &K, generation: Generation) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|&g| g == generation.0)
    }

    /// The latest generation for `key`, if any run has started.
    #[must_use]
    pub fn current(&self, key: &K) -> Option<Generation> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .map(Generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_runs_supersede_older_ones() {
        let tracker = GenerationTracker::new();
        let first = tracker.begin(&"layer");
        assert!(tracker.is_current(&"layer", first));

        let second = tracker.begin(&"layer");
        assert!(second > first);
        assert!(!tracker.is_current(&"layer", first));
        assert!(tracker.is_current(&"layer", second));
        assert_eq!(tracker.current(&"layer"), Some(second));
    }

    #[test]
    fn keys_are_independent() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin(&1);
        let b = tracker.begin(&2);
        assert!(tracker.is_current(&1, a));
        assert!(tracker.is_current(&2, b));
        assert!(!tracker.is_current(&3, a));
        assert_eq!(tracker.current(&3), None);
    }
}
