//! Progress-callback trait for run and per-chunk events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its states and as each chunk
//! starts, retries, completes or fails.
//!
//! Chunk events fire from concurrently running workers, in completion order,
//! so implementations must protect shared mutable state (`Mutex`,
//! `AtomicUsize`, …).
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_translate::{TranslationProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl TranslationProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, chunk: &str, _text_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{chunk} done ({done} so far)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn TranslationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::PipelineReport;
use crate::translate::PipelineState;
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once the document is partitioned.
    fn on_run_start(&self, total_chunks: usize, total_pages: usize) {
        let _ = (total_chunks, total_pages);
    }

    /// Called on every orchestrator state transition.
    fn on_state_change(&self, state: PipelineState) {
        let _ = state;
    }

    /// Called just before the first attempt for a chunk.
    fn on_chunk_start(&self, chunk: &str) {
        let _ = chunk;
    }

    /// Called when an attempt failed and the worker is about to back off.
    fn on_chunk_retry(&self, chunk: &str, attempt: u32, delay: Duration, error: &str) {
        let _ = (chunk, attempt, delay, error);
    }

    /// Called when a chunk is translated and relabelled.
    fn on_chunk_complete(&self, chunk: &str, text_len: usize) {
        let _ = (chunk, text_len);
    }

    /// Called when a chunk fails after all attempts.
    fn on_chunk_error(&self, chunk: &str, error: &str) {
        let _ = (chunk, error);
    }

    /// Called once after reassembly with the final report.
    fn on_run_complete(&self, report: &PipelineReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;
