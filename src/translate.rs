//! Run orchestration and the public `translate*` entry points.
//!
//! [`Pipeline::run`] walks one document through the state machine
//!
//! ```text
//! Idle ─▶ Partitioning ─▶ Dispatching ─▶ Reassembling ─▶ Done
//!              │
//!              └────────▶ Failed
//! ```
//!
//! Only a partition failure is fatal. Chunk failures are recorded and the run
//! still reassembles, even when every chunk failed. Nothing is retried at the
//! partition or reassembly level; retry lives in the worker.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::failure_log::FailureLog;
use crate::output::{DocumentInfo, PipelineOutput, PipelineReport};
use crate::pipeline::assemble::combine;
use crate::pipeline::dispatch::run_all;
use crate::pipeline::partition::{self, count_pdf_pages, plan_chunks, Chunk, PagedDocument};
use crate::pipeline::relabel::PageRelabeler;
use crate::pipeline::worker::WorkerContext;
use crate::source;
use crate::transform::{resolve_transformer, Transformer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrator states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Partitioning,
    Dispatching,
    Reassembling,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Partitioning)
                | (Partitioning, Dispatching)
                | (Partitioning, Failed)
                | (Dispatching, Reassembling)
                | (Reassembling, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The state of one run, with transitions reported to the progress callback.
struct RunTracker<'a> {
    state: PipelineState,
    config: &'a PipelineConfig,
}

impl<'a> RunTracker<'a> {
    fn new(config: &'a PipelineConfig) -> Self {
        Self {
            state: PipelineState::Idle,
            config,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} → {}",
            self.state,
            next
        );
        debug!("Pipeline state: {} → {}", self.state, next);
        self.state = next;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_state_change(next);
        }
    }
}

/// A configured pipeline. Cheap to reuse across documents; runs share no state
/// other than the read-only config, the transformer and the failure log.
pub struct Pipeline {
    config: PipelineConfig,
    transformer: Arc<dyn Transformer>,
    failure_log: Arc<FailureLog>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, transformer: Arc<dyn Transformer>) -> Self {
        let failure_log = Arc::new(FailureLog::from_option(config.failure_log.as_deref()));
        Self {
            config,
            transformer,
            failure_log,
        }
    }

    /// Build a pipeline, resolving the transformer from the config.
    ///
    /// # Errors
    /// [`PipelineError::ConfigurationMissing`] when no backend is configured.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let transformer = resolve_transformer(&config)?;
        Ok(Self::new(config, transformer))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Translate a PDF held in memory.
    ///
    /// Returns `Ok` whenever partitioning succeeded, even if some or all
    /// chunks failed; check `output.report.failures`.
    pub async fn run(&self, document: Vec<u8>) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        let mut tracker = RunTracker::new(&self.config);

        tracker.enter(PipelineState::Partitioning);
        let partition_start = Instant::now();
        let (total_pages, chunks) =
            match partition::partition_pdf(document, self.config.pages_per_chunk).await {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("Partitioning failed: {}", e);
                    tracker.enter(PipelineState::Failed);
                    return Err(e);
                }
            };
        let partition_ms = partition_start.elapsed().as_millis() as u64;

        Ok(self
            .dispatch_and_assemble(tracker, total_pages, chunks, partition_ms, started)
            .await)
    }

    /// Translate any [`PagedDocument`], partitioning on the calling thread.
    pub async fn run_paged<D: PagedDocument + ?Sized>(
        &self,
        document: &D,
    ) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        let mut tracker = RunTracker::new(&self.config);

        tracker.enter(PipelineState::Partitioning);
        let chunks = match partition::partition(document, self.config.pages_per_chunk) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Partitioning failed: {}", e);
                tracker.enter(PipelineState::Failed);
                return Err(e);
            }
        };
        let partition_ms = started.elapsed().as_millis() as u64;

        Ok(self
            .dispatch_and_assemble(tracker, document.page_count(), chunks, partition_ms, started)
            .await)
    }

    async fn dispatch_and_assemble(
        &self,
        mut tracker: RunTracker<'_>,
        total_pages: usize,
        chunks: Vec<Chunk>,
        partition_ms: u64,
        started: Instant,
    ) -> PipelineOutput {
        let total_chunks = chunks.len();
        info!("{} pages → {} chunks", total_pages, total_chunks);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(total_chunks, total_pages);
        }

        tracker.enter(PipelineState::Dispatching);
        let dispatch_start = Instant::now();
        let results = run_all(self.worker_context(), chunks, self.config.concurrency).await;
        let dispatch_ms = dispatch_start.elapsed().as_millis() as u64;

        tracker.enter(PipelineState::Reassembling);
        let assembly = combine(results, &self.config.chunk_separator);

        tracker.enter(PipelineState::Done);
        let report = PipelineReport {
            total_pages,
            state: PipelineState::Done,
            partition_duration_ms: partition_ms,
            dispatch_duration_ms: dispatch_ms,
            total_duration_ms: started.elapsed().as_millis() as u64,
            ..assembly.report
        };

        info!(
            "Translation complete: {}/{} chunks, {}ms total",
            report.succeeded, report.total_chunks, report.total_duration_ms
        );
        if report.failed > 0 {
            warn!(
                "{} chunk(s) failed: {}",
                report.failed,
                report.failed_chunks().collect::<Vec<_>>().join(", ")
            );
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(&report);
        }

        PipelineOutput {
            text: assembly.text,
            report,
        }
    }

    fn worker_context(&self) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            transformer: Arc::clone(&self.transformer),
            retry: self.config.retry,
            target_language: self.config.target_language.clone(),
            relabeler: PageRelabeler::new(&self.config.labels),
            clean_output: self.config.clean_output,
            failure_log: Arc::clone(&self.failure_log),
            progress: self.config.progress_callback.clone(),
        })
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Translate a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(PipelineOutput)` once the document was partitioned and reassembled,
/// even if some chunks failed (check `output.report.failures`).
///
/// # Errors
/// Returns `Err(PipelineError)` only for fatal errors:
/// - No backend configured (checked before any I/O)
/// - Source not found or download failed
/// - Not a valid PDF
pub async fn translate(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let input = input.as_ref();
    info!("Starting translation: {}", input);

    let pipeline = Pipeline::from_config(config.clone())?;
    let bytes = source::load_input(input, config.download_timeout_secs).await?;
    pipeline.run(bytes).await
}

/// Translate PDF bytes already in memory.
pub async fn translate_bytes(
    bytes: Vec<u8>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    Pipeline::from_config(config.clone())?.run(bytes).await
}

/// Translate and write the combined text to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn translate_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError> {
    let output = translate(input, config).await?;
    let path = output_path.as_ref();
    write_atomic(path, &output.text).await?;

    let mut report = output.report;
    report.output = Some(path.display().to_string());
    Ok(report)
}

/// Synchronous wrapper around [`translate`].
///
/// Creates a temporary tokio runtime internally.
pub fn translate_sync(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(translate(input, config))
}

/// Page count and chunk plan, without translating.
///
/// Does not require an LLM provider or API key. `download_timeout_secs`
/// applies when `input` is a URL.
pub async fn inspect(
    input: impl AsRef<str>,
    pages_per_chunk: usize,
    download_timeout_secs: u64,
) -> Result<DocumentInfo, PipelineError> {
    if pages_per_chunk == 0 {
        return Err(PipelineError::InvalidConfig(
            "pages_per_chunk must be ≥ 1".into(),
        ));
    }
    let bytes = source::load_input(input.as_ref(), download_timeout_secs).await?;
    let page_count = count_pdf_pages(bytes).await?;
    Ok(DocumentInfo {
        page_count,
        chunks: plan_chunks(page_count, pages_per_chunk),
    })
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let write_err = |source| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
