//! Bounded-concurrency dispatch: one worker task per chunk.
//!
//! Each chunk runs in its own `tokio::spawn`ed task, so its backoff sleeps and
//! backend calls never stall siblings, and a panic inside one worker is caught
//! at its `JoinHandle` instead of unwinding through the dispatcher.
//! `buffer_unordered(limit)` only spawns a new task when one of the `limit`
//! in-flight tasks has finished.
//!
//! Results come back in **completion order**. Page order is restored later,
//! by the assembler, from each result's chunk identity.

use crate::error::ChunkError;
use crate::output::ChunkResult;
use crate::pipeline::partition::Chunk;
use crate::pipeline::worker::{process_chunk, WorkerContext};
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info};

/// Run every chunk through a worker, at most `concurrency` at a time.
///
/// Returns exactly one [`ChunkResult`] per input chunk, in completion order.
/// A failing or panicking chunk never cancels the others.
pub async fn run_all(
    ctx: Arc<WorkerContext>,
    chunks: Vec<Chunk>,
    concurrency: usize,
) -> Vec<ChunkResult> {
    let total = chunks.len();
    let limit = concurrency.max(1);
    info!("Dispatching {} chunks across {} workers", total, limit);

    let results: Vec<ChunkResult> = stream::iter(chunks.into_iter().map(|chunk| {
        let ctx = Arc::clone(&ctx);
        async move { run_one(ctx, chunk).await }
    }))
    .buffer_unordered(limit)
    .collect()
    .await;

    debug_assert_eq!(results.len(), total);
    results
}

async fn run_one(ctx: Arc<WorkerContext>, chunk: Chunk) -> ChunkResult {
    let range = chunk.range;
    let name = range.name();
    if let Some(ref cb) = ctx.progress {
        cb.on_chunk_start(&name);
    }

    let worker_ctx = Arc::clone(&ctx);
    let handle = tokio::spawn(async move { process_chunk(&worker_ctx, &chunk).await });

    let result = match handle.await {
        Ok(result) => result,
        Err(join_err) => {
            let detail = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                "worker task cancelled".to_string()
            };
            error!("{}: worker died — {}", name, detail);
            ctx.failure_log.record(&name, &detail).await;
            ChunkResult::Failure {
                range,
                error: ChunkError::WorkerPanicked {
                    chunk: name.clone(),
                    detail,
                },
            }
        }
    };

    if let Some(ref cb) = ctx.progress {
        match &result {
            ChunkResult::Success(s) => {
                info!("{}: translated ({} chars)", name, s.text.len());
                cb.on_chunk_complete(&name, s.text.len());
            }
            ChunkResult::Failure { error, .. } => cb.on_chunk_error(&name, &error.to_string()),
        }
    } else if let ChunkResult::Success(s) = &result {
        info!("{}: translated ({} chars)", name, s.text.len());
    }

    result
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::TransformError;
    use crate::pipeline::partition::{plan_chunks, PageRange};
    use crate::transform::{TransformOutput, TransformRequest, Transformer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers "page 1" after a per-chunk delay; tracks peak concurrency.
    #[derive(Default)]
    struct Timed {
        slow_chunk: Option<&'static str>,
        panic_chunk: Option<&'static str>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for Timed {
        async fn transform(
            &self,
            request: TransformRequest<'_>,
        ) -> Result<TransformOutput, TransformError> {
            if self.panic_chunk == Some(request.chunk) {
                panic!("backend exploded on {}", request.chunk);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = if self.slow_chunk == Some(request.chunk) {
                Duration::from_secs(60)
            } else {
                Duration::from_secs(1)
            };
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TransformOutput::text(format!("{} page 1", request.chunk)))
        }
    }

    fn chunks(total_pages: usize, per_chunk: usize) -> Vec<Chunk> {
        plan_chunks(total_pages, per_chunk)
            .into_iter()
            .map(|range| Chunk {
                range,
                bytes: Vec::new(),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn respects_concurrency_limit() {
        let t = Arc::new(Timed::default());
        let ctx = Arc::new(WorkerContext::new(t.clone(), RetryPolicy::immediate(1)));
        let results = run_all(ctx, chunks(120, 10), 3).await;
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(ChunkResult::is_success));
        assert_eq!(t.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_chunk_does_not_block_collection() {
        let t = Arc::new(Timed {
            slow_chunk: Some("pages_1-10"),
            ..Default::default()
        });
        let ctx = Arc::new(WorkerContext::new(t, RetryPolicy::immediate(1)));
        let results = run_all(ctx, chunks(50, 10), 2).await;

        let order: Vec<usize> = results.iter().map(|r| r.range().start).collect();
        assert_eq!(order.len(), 5);
        assert_eq!(*order.last().unwrap(), 1, "slow chunk finishes last: {order:?}");
        assert_eq!(order[0], 11);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_chunk_is_isolated() {
        let t = Arc::new(Timed {
            panic_chunk: Some("pages_11-20"),
            ..Default::default()
        });
        let ctx = Arc::new(WorkerContext::new(t, RetryPolicy::immediate(3)));
        let results = run_all(ctx, chunks(25, 10), 4).await;

        assert_eq!(results.len(), 3);
        let failed: Vec<&ChunkResult> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        match failed[0] {
            ChunkResult::Failure { range, error } => {
                assert_eq!(*range, PageRange::new(11, 20));
                assert!(matches!(error, ChunkError::WorkerPanicked { .. }));
                assert!(error.reason().contains("backend exploded"), "{error}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_input_yields_no_results() {
        let ctx = Arc::new(WorkerContext::new(
            Arc::new(Timed::default()),
            RetryPolicy::immediate(1),
        ));
        assert!(run_all(ctx, Vec::new(), 4).await.is_empty());
    }
}
