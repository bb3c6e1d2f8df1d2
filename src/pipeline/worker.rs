//! Chunk worker: drive the transformer for one chunk with retry and backoff.
//!
//! ## Retry Strategy
//!
//! Backend failures under concurrent load are mostly transient (rate limits,
//! overloaded endpoints). The worker makes up to `max_attempts` calls and
//! waits `base_delay + uniform(0, jitter)` between them, never after the last
//! one. With the defaults (3 attempts, 5 s + ≤3 s) a chunk gives up after at
//! most ~16 s of backoff.
//!
//! ## Failure isolation
//!
//! [`process_chunk`] always returns a [`ChunkResult`]; it never propagates an
//! error, so one bad chunk cannot take its siblings down. An exhausted chunk
//! is appended to the [`FailureLog`] before its `Failure` is returned.

use crate::config::RetryPolicy;
use crate::error::{ChunkError, TransformError};
use crate::failure_log::FailureLog;
use crate::output::{ChunkResult, ChunkSuccess};
use crate::pipeline::partition::Chunk;
use crate::pipeline::postprocess::clean_translation;
use crate::pipeline::relabel::{numbering_anomalies, PageRelabeler};
use crate::progress::ProgressCallback;
use crate::transform::{TransformOutput, TransformRequest, Transformer};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Everything a worker needs, shared read-only by all workers of a run.
#[derive(Clone)]
pub struct WorkerContext {
    pub transformer: Arc<dyn Transformer>,
    pub retry: RetryPolicy,
    pub target_language: String,
    pub relabeler: PageRelabeler,
    pub clean_output: bool,
    pub failure_log: Arc<FailureLog>,
    pub progress: Option<ProgressCallback>,
}

impl WorkerContext {
    /// A context with default labels, cleanup on, and no failure log.
    pub fn new(transformer: Arc<dyn Transformer>, retry: RetryPolicy) -> Self {
        Self {
            transformer,
            retry,
            target_language: "Arabic".to_string(),
            relabeler: PageRelabeler::default(),
            clean_output: true,
            failure_log: Arc::new(FailureLog::disabled()),
            progress: None,
        }
    }
}

/// Translate one chunk and relabel its page markers.
pub async fn process_chunk(ctx: &WorkerContext, chunk: &Chunk) -> ChunkResult {
    let name = chunk.name();
    let max_attempts = ctx.retry.max_attempts.max(1);
    let mut last_err = TransformError::Backend("no attempt made".to_string());

    for attempt in 1..=max_attempts {
        debug!("{}: attempt {}/{}", name, attempt, max_attempts);

        let request = TransformRequest {
            chunk: &name,
            bytes: &chunk.bytes,
            target_language: &ctx.target_language,
        };

        match ctx.transformer.transform(request).await {
            Ok(output) if !output.text.trim().is_empty() => {
                return ChunkResult::Success(finish(ctx, chunk, output, attempt));
            }
            Ok(_) => {
                warn!("{}: attempt {} returned no text", name, attempt);
                last_err = TransformError::EmptyResponse;
            }
            Err(e) => {
                warn!("{}: attempt {} failed — {}", name, attempt, e);
                last_err = e;
            }
        }

        if attempt < max_attempts {
            let delay = ctx.retry.next_delay();
            warn!(
                "{}: retrying in {:.1}s ({}/{})",
                name,
                delay.as_secs_f64(),
                attempt + 1,
                max_attempts
            );
            if let Some(ref cb) = ctx.progress {
                cb.on_chunk_retry(&name, attempt, delay, &last_err.to_string());
            }
            sleep(delay).await;
        }
    }

    warn!("{}: max attempts reached", name);
    let error = ChunkError::TransformFailed {
        chunk: name.clone(),
        attempts: max_attempts,
        detail: last_err.to_string(),
    };
    ctx.failure_log.record(&name, error.reason()).await;

    ChunkResult::Failure {
        range: chunk.range,
        error,
    }
}

/// Clean, validate and relabel a successful translation.
fn finish(ctx: &WorkerContext, chunk: &Chunk, output: TransformOutput, attempts: u32) -> ChunkSuccess {
    let text = if ctx.clean_output {
        clean_translation(&output.text)
    } else {
        output.text
    };

    let local = ctx.relabeler.marker_numbers(&text);
    let anomalies = numbering_anomalies(&local, chunk.range.len());
    if anomalies > 0 {
        warn!(
            "{}: {} page marker(s) out of sequence {:?}; global numbers may be wrong",
            chunk.range, anomalies, local
        );
    }

    ChunkSuccess {
        range: chunk.range,
        text: ctx.relabeler.rewrite(&text, chunk.range.start),
        attempts,
        input_tokens: output.input_tokens,
        output_tokens: output.output_tokens,
        numbering_anomalies: anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::partition::PageRange;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls, then answers with `text`.
    struct Flaky {
        failures: u32,
        text: &'static str,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, text: &'static str) -> Self {
            Self {
                failures,
                text,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transformer for Flaky {
        async fn transform(
            &self,
            _request: TransformRequest<'_>,
        ) -> Result<TransformOutput, TransformError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(TransformError::Backend(format!("HTTP 503 (call {n})")))
            } else {
                Ok(TransformOutput::text(self.text))
            }
        }
    }

    fn chunk(start: usize, end: usize) -> Chunk {
        Chunk {
            range: PageRange::new(start, end),
            bytes: b"%PDF-1.5".to_vec(),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_sleep_between_attempts_only() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("errors.log");
        let flaky = Arc::new(Flaky::new(u32::MAX, ""));
        let mut ctx = WorkerContext::new(flaky.clone(), policy(3));
        ctx.failure_log = Arc::new(FailureLog::new(&log_path));

        let started = tokio::time::Instant::now();
        let result = process_chunk(&ctx, &chunk(11, 20)).await;

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        // Two waits of 5 s: between attempts 1→2 and 2→3, none after 3.
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        match result {
            ChunkResult::Failure { range, error } => {
                assert_eq!(range, PageRange::new(11, 20));
                assert!(matches!(error, ChunkError::TransformFailed { attempts: 3, .. }));
                assert!(error.reason().contains("call 3"), "{error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log, "pages_11-20 failed: HTTP 503 (call 3)\n");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let flaky = Arc::new(Flaky::new(1, "page 1\ntext\npage 2"));
        let ctx = WorkerContext::new(flaky.clone(), policy(3));

        let started = tokio::time::Instant::now();
        let result = process_chunk(&ctx, &chunk(11, 20)).await;

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        match result {
            ChunkResult::Success(s) => {
                assert_eq!(s.attempts, 2);
                assert_eq!(s.text, "page 11\ntext\npage 12");
                assert_eq!(s.numbering_anomalies, 0);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let flaky = Arc::new(Flaky::new(u32::MAX, ""));
        let ctx = WorkerContext::new(flaky.clone(), RetryPolicy::immediate(1));
        let result = process_chunk(&ctx, &chunk(1, 10)).await;
        assert!(!result.is_success());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_output_counts_as_failed_attempt() {
        let flaky = Arc::new(Flaky::new(0, "  \n "));
        let ctx = WorkerContext::new(flaky.clone(), RetryPolicy::immediate(2));
        let result = process_chunk(&ctx, &chunk(1, 10)).await;
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        match result {
            ChunkResult::Failure { error, .. } => assert_eq!(error.reason(), "empty response"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_is_cleaned_before_relabelling() {
        let flaky = Arc::new(Flaky::new(0, "```text\r\nصفحة 1\r\nنص\r\n```"));
        let ctx = WorkerContext::new(flaky, RetryPolicy::immediate(1));
        let result = process_chunk(&ctx, &chunk(21, 25)).await;
        assert_eq!(result.text(), Some("صفحة 21\nنص"));
    }

    #[tokio::test]
    async fn out_of_sequence_markers_are_counted_not_fixed() {
        let flaky = Arc::new(Flaky::new(0, "page 2\npage 1\npage 9"));
        let ctx = WorkerContext::new(flaky, RetryPolicy::immediate(1));
        match process_chunk(&ctx, &chunk(1, 5)).await {
            ChunkResult::Success(s) => {
                assert_eq!(s.numbering_anomalies, 2);
                assert_eq!(s.text, "page 2\npage 1\npage 9");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
