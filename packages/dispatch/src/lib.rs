#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounded-concurrency dispatch of CPU-bound work.
//!
//! A [`Pipeline`] runs one pure function over a list of independent
//! inputs on tokio's blocking pool, with at most `concurrency` units in
//! flight, and resolves once every unit has finished. Results come back in
//! input order.

pub mod generation;
pub mod progress;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt as _};
use thiserror::Error;

pub use generation::{Generation, GenerationTracker};
pub use progress::DispatchProgress;

/// Worker count used when hardware parallelism cannot be determined.
pub const FALLBACK_CONCURRENCY: usize = 4;

/// Errors from dispatched work.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A worker panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Available hardware parallelism, or [`FALLBACK_CONCURRENCY`].
#[must_use]
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(FALLBACK_CONCURRENCY, NonZeroUsize::get)
}

/// Runs independent units of work with a concurrency limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipeline {
    concurrency: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

impl Pipeline {
    /// Creates a pipeline running at most `concurrency` units at once.
    /// A limit of `0` is treated as `1`.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum units in flight.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Applies `work` to every item and collects the results in input
    /// order.
    ///
    /// Each item runs on the blocking thread pool. `progress` hears about
    /// the unit count up front, each unit as it is collected, and the end
    /// of the run. Pass `&()` to run unobserved.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Worker`] if any unit panicked. All other
    /// units still run to completion first.
    pub async fn run<I, O, F>(
        &self,
        items: Vec<I>,
        work: F,
        progress: &dyn DispatchProgress,
    ) -> Result<Vec<O>, DispatchError>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let total = items.len();
        log::debug!(
            "Dispatching {total} units (concurrency={})",
            self.concurrency
        );

        let started = Instant::now();
        progress.start(total as u64);

        let work = Arc::new(work);
        let results: Vec<_> = stream::iter(items.into_iter().map(|item| {
            let work = Arc::clone(&work);
            tokio::task::spawn_blocking(move || work(item))
        }))
        .buffered(self.concurrency)
        .inspect(|_| progress.unit_done())
        .collect()
        .await;

        progress.complete();

        let outputs = results.into_iter().collect::<Result<Vec<O>, _>>()?;
        log::debug!("All {total} units finished in {:?}", started.elapsed());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct CountingProgress {
        total: AtomicU64,
        done: AtomicU64,
        completed: AtomicBool,
    }

    impl DispatchProgress for CountingProgress {
        fn start(&self, units: u64) {
            self.total.store(units, Ordering::SeqCst);
        }
        fn unit_done(&self) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
        fn complete(&self) {
            self.completed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let items: Vec<u64> = (0..50).collect();
        let out = Pipeline::new(8)
            .run(
                items,
                |n| {
                    std::thread::sleep(Duration::from_millis((50 - n) % 7));
                    n * 2
                },
                &(),
            )
            .await
            .unwrap();
        assert_eq!(out, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_the_concurrency_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        Pipeline::new(3)
            .run(
                (0..24).collect::<Vec<u32>>(),
                move |_| {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    a.fetch_sub(1, Ordering::SeqCst);
                },
                &(),
            )
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn reports_progress_per_unit() {
        let counting = CountingProgress::default();

        Pipeline::new(2)
            .run(vec![1, 2, 3, 4, 5], |n: i32| n + 1, &counting)
            .await
            .unwrap();

        assert_eq!(counting.total.load(Ordering::SeqCst), 5);
        assert_eq!(counting.done.load(Ordering::SeqCst), 5);
        assert!(counting.completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn worker_panics_surface_as_errors() {
        let result = Pipeline::new(2)
            .run(
                vec![1, 2, 3],
                |n: i32| {
                    assert!(n != 2, "boom");
                    n
                },
                &(),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::Worker(_))));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let out: Vec<i32> = Pipeline::default()
            .run(Vec::<i32>::new(), |n| n, &())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        assert_eq!(Pipeline::new(0).concurrency(), 1);
        assert!(default_concurrency() >= 1);
    }
}
