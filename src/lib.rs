//! # edgequake-pdf-translate
//!
//! Translate large PDF documents with an LLM, a few pages at a time, in
//! parallel, and stitch the results back together in page order.
//!
//! ## Why chunk at all?
//!
//! A vision-capable LLM can translate a PDF directly, but a 300-page book
//! blows past both the request size limit and the output token budget. Ten
//! pages at a time fits comfortably, and because chunks are independent they
//! can be translated concurrently. The model only sees its own chunk, so it
//! numbers pages from 1; every `page N` / `صفحة N` marker it writes is shifted
//! back to the page's position in the whole document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Partition   split into pages_1-10, pages_11-20, … (lopdf, spawn_blocking)
//!  ├─ 2. Dispatch    ≤ concurrency worker tasks, one per chunk
//!  ├─ 3. Transform   LLM call with retry + jittered backoff
//!  ├─ 4. Relabel     chunk-local page markers → global page numbers
//!  └─ 5. Reassemble  page order, failed chunks reported not filled
//! ```
//!
//! A chunk that still fails after every attempt is logged and left out; the
//! run carries on. Only an unreadable document is fatal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_translate::{translate, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = PipelineConfig::builder()
//!         .target_language("Arabic")
//!         .pages_per_chunk(10)
//!         .build()?;
//!     let output = translate("book.pdf", &config).await?;
//!     println!("{}", output.text);
//!     for failed in &output.report.failures {
//!         eprintln!("missing {}: {}", failed.chunk, failed.reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-translate` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf-translate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod event;
pub mod failure_log;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod source;
pub mod transform;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ChunkSeparator, PipelineConfig, PipelineConfigBuilder, RetryPolicy};
pub use error::{ChunkError, PipelineError, TransformError};
pub use event::{
    derive_output_key, handle_event, EventSettings, LocalObjectStore, ObjectStore, StatusResponse,
    TriggerEvent,
};
pub use failure_log::FailureLog;
pub use output::{ChunkResult, DocumentInfo, FailedChunk, PipelineOutput, PipelineReport};
pub use pipeline::partition::{PageRange, PagedDocument};
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
pub use transform::{LlmTransformer, TransformOutput, TransformRequest, Transformer};
pub use translate::{
    inspect, translate, translate_bytes, translate_sync, translate_to_file, Pipeline, PipelineState,
};
