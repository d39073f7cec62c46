//! Progress-callback trait for per-batch classification events.
//!
//! Inject an [`Arc<dyn ClassificationProgressCallback>`] via
//! [`crate::config::ClassifierConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts each batch and identifies the structure.
//!
//! # Example
//!
//! ```rust
//! use edgequake_minutebook::{ClassificationProgressCallback, ClassifierConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ClassificationProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch: usize, total_batches: usize, pages: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("batch {batch}/{total_batches} done ({pages} pages, {done} so far)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ClassifierConfig::builder()
//!     .progress_callback(counter as Arc<dyn ClassificationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each batch.
///
/// Implementations must be `Send + Sync`: batch events fire concurrently
/// from up to `concurrency` workers. All methods have no-op defaults.
pub trait ClassificationProgressCallback: Send + Sync {
    /// Called once after batching, before any model call.
    fn on_run_start(&self, total_pages: usize, total_batches: usize) {
        let _ = (total_pages, total_batches);
    }

    /// Called just before the first vision request of a batch.
    fn on_batch_start(&self, batch: usize, total_batches: usize) {
        let _ = (batch, total_batches);
    }

    /// Called when a batch's text has been extracted.
    fn on_batch_complete(&self, batch: usize, total_batches: usize, pages: usize) {
        let _ = (batch, total_batches, pages);
    }

    /// Called when a batch failed to render or exhausted its retries.
    fn on_batch_error(&self, batch: usize, total_batches: usize, error: &str) {
        let _ = (batch, total_batches, error);
    }

    /// Called before each structure-identification call.
    ///
    /// `chunks` is the active chunk strategy, `attempt` is 1-based.
    fn on_structure_attempt(&self, chunks: usize, attempt: u32) {
        let _ = (chunks, attempt);
    }

    /// Called once when the final section list is ready.
    fn on_run_complete(&self, sections: usize, failed_pages: usize) {
        let _ = (sections, failed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ClassificationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClassifierConfig`].
pub type ProgressCallback = Arc<dyn ClassificationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        structure_attempts: AtomicUsize,
    }

    impl ClassificationProgressCallback for TrackingCallback {
        fn on_batch_start(&self, _batch: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch: usize, _total: usize, _pages: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_error(&self, _batch: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_structure_attempt(&self, _chunks: usize, _attempt: u32) {
            self.structure_attempts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(13, 3);
        cb.on_batch_start(1, 3);
        cb.on_batch_complete(1, 3, 6);
        cb.on_batch_error(2, 3, "timeout");
        cb.on_structure_attempt(1, 1);
        cb.on_run_complete(4, 6);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(1, 2);
        tracker.on_batch_complete(1, 2, 6);
        tracker.on_batch_start(2, 2);
        tracker.on_batch_error(2, 2, "rate limited");
        tracker.on_structure_attempt(1, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.structure_attempts.load(Ordering::SeqCst), 1);
    }
}
