//! Reassembly: merge per-chunk translations back into one document.
//!
//! Results arrive in completion order. They are keyed by chunk identity
//! (start page) before anything is concatenated, so the combined text is
//! always in original page order whatever order the workers finished in.
//! Failed chunks contribute no text; the gap is reported, not filled.

use crate::config::ChunkSeparator;
use crate::output::{ChunkResult, FailedChunk, PipelineReport};
use std::collections::BTreeMap;
use tracing::warn;

/// The combined text and the chunk-level part of the run report.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub text: String,
    pub report: PipelineReport,
}

/// Combine `results` in page order.
///
/// Each successful chunk is framed by blank lines; `separator` (if any) sits
/// between consecutive successful chunks.
pub fn combine(results: Vec<ChunkResult>, separator: &ChunkSeparator) -> Assembly {
    let mut by_start: BTreeMap<usize, ChunkResult> = BTreeMap::new();
    for result in results {
        let start = result.range().start;
        if by_start.insert(start, result).is_some() {
            warn!("Duplicate result for chunk starting at page {}; keeping the last", start);
        }
    }

    let mut report = PipelineReport {
        total_chunks: by_start.len(),
        ..Default::default()
    };
    let mut text = String::new();

    for result in by_start.into_values() {
        match result {
            ChunkResult::Success(s) => {
                if report.succeeded > 0 {
                    let sep = separator.render(&s.range.name());
                    if !sep.is_empty() {
                        text.push_str(&sep);
                    }
                }
                text.push_str("\n\n");
                text.push_str(&s.text);
                text.push_str("\n\n");

                report.succeeded += 1;
                report.numbering_anomalies += s.numbering_anomalies;
                report.total_input_tokens += s.input_tokens as u64;
                report.total_output_tokens += s.output_tokens as u64;
            }
            ChunkResult::Failure { range, error } => {
                report.failed += 1;
                report.failures.push(FailedChunk {
                    chunk: range.name(),
                    pages: range,
                    reason: error.reason().to_string(),
                });
            }
        }
    }

    Assembly { text, report }
}
