//! Progress hooks for dispatched work.
//!
//! The dispatcher knows how many units a run has and when each one
//! finishes. Rendering that is left to the caller; `()` is the no-op
//! observer.

/// Observes one [`Pipeline::run`](crate::Pipeline::run).
///
/// Units finish on worker threads but are reported from the collecting
/// task, in input order.
pub trait DispatchProgress: Send + Sync {
    /// A run over `units` work units is starting.
    fn start(&self, units: u64) {
        let _ = units;
    }

    /// The next unit, in input order, has finished.
    fn unit_done(&self) {}

    /// Every unit has finished or failed.
    fn complete(&self) {}
}

impl DispatchProgress for () {}
