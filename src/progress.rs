//! Progress-callback trait for per-unit analysis events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::ReportConfigBuilder::progress_callback`] to receive
//! events while the dispatcher works through the batch.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2report::{ReportConfig, ReportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ReportProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, index: usize, total: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Unit {}/{} done ({} bytes)", index + 1, total, text_len);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//! let config = ReportConfig::builder()
//!     .progress_callback(cb as Arc<dyn ReportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it analyses each unit.
///
/// Unit events fire from concurrent workers, so implementations must guard
/// shared mutable state (`Mutex`, atomics). Every method has a no-op default.
///
/// `index` arguments are 0-based `sequence_index` values.
pub trait ReportProgressCallback: Send + Sync {
    /// Called once after extraction, before any analysis call.
    fn on_batch_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called just before the analysis call for a unit is issued.
    fn on_unit_start(&self, index: usize, total_units: usize) {
        let _ = (index, total_units);
    }

    /// Called when a unit's analysis succeeded.
    ///
    /// `text_len` is the byte length of the raw model response.
    fn on_unit_complete(&self, index: usize, total_units: usize, text_len: usize) {
        let _ = (index, total_units, text_len);
    }

    /// Called when a unit's analysis failed.
    fn on_unit_error(&self, index: usize, total_units: usize, error: &str) {
        let _ = (index, total_units, error);
    }

    /// Called once after every unit has an outcome.
    fn on_batch_complete(&self, total_units: usize, success_count: usize) {
        let _ = (total_units, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReportConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;
