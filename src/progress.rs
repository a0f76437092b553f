//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the driver walks the page range. The CLI renders them with a
//! progress bar; tests use them to observe which pages hit the cache.
//!
//! # Example
//!
//! ```rust
//! use drumgrid_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     patterns: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page: usize, names: &[&str], skipped: usize) {
//!         self.patterns.fetch_add(names.len(), Ordering::SeqCst);
//!         eprintln!("Page {page}: {} patterns ({skipped} skipped)", names.len());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { patterns: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction driver as it processes each page.
///
/// Pages are processed one at a time in ascending order, so events for a
/// page always arrive in the order `rendered → sent → complete | error`.
/// All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first page.
    fn on_run_start(&self, first_page: usize, last_page: usize) {
        let _ = (first_page, last_page);
    }

    /// Called when a page is served from its cache file or error marker.
    fn on_page_cached(&self, page: usize, pattern_count: usize, errored: bool) {
        let _ = (page, pattern_count, errored);
    }

    /// Called after the page has been rasterised.
    fn on_page_rendered(&self, page: usize, image_bytes: usize) {
        let _ = (page, image_bytes);
    }

    /// Called just before the page image is sent to the recognizer.
    fn on_page_sent(&self, page: usize) {
        let _ = page;
    }

    /// Called when a fetched page has been normalised and cached.
    ///
    /// `names` are the display names of the kept patterns; `skipped` counts
    /// records the normalizer dropped.
    fn on_page_complete(&self, page: usize, names: &[&str], skipped: usize) {
        let _ = (page, names, skipped);
    }

    /// Called when a page fails and its error marker has been written.
    fn on_page_error(&self, page: usize, error: &str) {
        let _ = (page, error);
    }

    /// Called once after the last page.
    fn on_run_complete(&self, total_patterns: usize, first_page: usize, last_page: usize) {
        let _ = (total_patterns, first_page, last_page);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        cached: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        patterns: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_page_cached(&self, _page: usize, _pattern_count: usize, _errored: bool) {
            self.cached.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page: usize, names: &[&str], _skipped: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.patterns.fetch_add(names.len(), Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(9, 13);
        cb.on_page_cached(9, 2, false);
        cb.on_page_rendered(10, 1024);
        cb.on_page_sent(10);
        cb.on_page_complete(10, &["Rock 1"], 0);
        cb.on_page_error(11, "bad response");
        cb.on_run_complete(3, 9, 13);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_page_cached(9, 2, false);
        tracker.on_page_complete(10, &["Rock 1", "Rock 2"], 1);
        tracker.on_page_error(11, "timeout");

        assert_eq!(tracker.cached.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.patterns.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(1, 1);
        cb.on_page_sent(1);
    }
}
