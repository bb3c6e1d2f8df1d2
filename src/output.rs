//! Result types: per-chunk outcomes, the run report, and the final output.

use crate::error::ChunkError;
use crate::pipeline::partition::PageRange;
use crate::translate::PipelineState;
use serde::{Deserialize, Serialize};

/// The outcome of one chunk, produced exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkResult {
    /// The chunk was translated; `text` already carries global page numbers.
    Success(ChunkSuccess),
    /// Every attempt failed; the chunk contributes nothing to the output.
    Failure { range: PageRange, error: ChunkError },
}

/// A translated, relabelled chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSuccess {
    pub range: PageRange,
    pub text: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Page markers whose local numbering looked wrong (see [`crate::pipeline::relabel::numbering_anomalies`]).
    pub numbering_anomalies: usize,
}

impl ChunkResult {
    /// Chunk identity: the page range, ordered by its start page.
    pub fn range(&self) -> PageRange {
        match self {
            ChunkResult::Success(s) => s.range,
            ChunkResult::Failure { range, .. } => *range,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkResult::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ChunkResult::Success(s) => Some(&s.text),
            ChunkResult::Failure { .. } => None,
        }
    }
}

/// One entry of the failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChunk {
    /// Chunk name, e.g. `pages_11-20`.
    pub chunk: String,
    pub pages: PageRange,
    pub reason: String,
}

/// Aggregate outcome of one run.
///
/// A run that reaches [`PipelineState::Done`] is a success even when some
/// chunks failed; check [`PipelineReport::is_complete`] or
/// [`PipelineReport::failures`] before treating the output as whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub total_pages: usize,
    pub total_chunks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed chunks in page order.
    pub failures: Vec<FailedChunk>,
    /// Where the combined document was written, once a sink has stored it.
    pub output: Option<String>,
    pub state: PipelineState,
    pub numbering_anomalies: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub partition_duration_ms: u64,
    pub dispatch_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl PipelineReport {
    /// True when no chunk failed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Names of the failed chunks, in page order.
    pub fn failed_chunks(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.chunk.as_str())
    }
}

/// Combined document plus its report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub text: String,
    pub report: PipelineReport,
}

/// Page count and chunk plan of a document, without translating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub chunks: Vec<PageRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_has_no_text() {
        let r = ChunkResult::Failure {
            range: PageRange::new(11, 20),
            error: ChunkError::WorkerPanicked {
                chunk: "pages_11-20".into(),
                detail: "boom".into(),
            },
        };
        assert!(!r.is_success());
        assert_eq!(r.text(), None);
        assert_eq!(r.range().start, 11);
    }

    #[test]
    fn report_serialises_to_json() {
        let report = PipelineReport {
            total_pages: 25,
            total_chunks: 3,
            succeeded: 2,
            failed: 1,
            failures: vec![FailedChunk {
                chunk: "pages_11-20".into(),
                pages: PageRange::new(11, 20),
                reason: "quota".into(),
            }],
            state: PipelineState::Done,
            ..Default::default()
        };
        let json = serde_json::to_string(&report).expect("serialise");
        assert!(json.contains("\"pages_11-20\""), "{json}");
        assert!(json.contains("\"Done\""), "{json}");
        assert!(!report.is_complete());
        assert_eq!(report.failed_chunks().collect::<Vec<_>>(), vec!["pages_11-20"]);
    }
}
