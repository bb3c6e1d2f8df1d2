//! Error types for the edgequake-pdf-translate library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] (**fatal**): the run cannot proceed at all (unparseable
//!   PDF, missing configuration, source or sink unreachable). Returned as
//!   `Err(PipelineError)` from the top-level `translate*` functions.
//!
//! * [`ChunkError`] (**non-fatal**): one chunk could not be translated after
//!   every attempt. Recorded in [`crate::output::PipelineReport`] so callers
//!   can see exactly which page ranges are missing from the output.
//!
//! * [`TransformError`]: a single failed attempt against the transformation
//!   backend. The worker retries these; only the last one survives, folded
//!   into a [`ChunkError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf-translate library.
///
/// Chunk-level failures use [`ChunkError`] and are stored in the run report
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The input bytes could not be parsed or paginated as a PDF.
    #[error("Invalid document: {detail}")]
    InvalidDocument { detail: String },

    /// The PDF parsed but contains no pages.
    #[error("Document has no pages")]
    EmptyDocument,

    // ── I/O collaborators ─────────────────────────────────────────────────
    /// The source document could not be retrieved.
    #[error("Source '{location}' is unavailable: {reason}")]
    SourceUnavailable { location: String, reason: String },

    /// The combined document could not be stored.
    #[error("Sink '{location}' is unavailable: {reason}")]
    SinkUnavailable { location: String, reason: String },

    /// Could not create or write the local output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Trigger errors ────────────────────────────────────────────────────
    /// The object key does not carry the required extension.
    #[error("Unsupported file extension for key '{key}' (expected .{expected})")]
    UnsupportedExtension { key: String, expected: String },

    /// The trigger event is malformed (no record, missing bucket/key).
    #[error("Invalid trigger event: {0}")]
    InvalidEvent(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// A required setting (credential, destination) is absent.
    #[error("Missing required configuration '{name}'.\n{hint}")]
    ConfigurationMissing { name: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP-style status for the trigger contract. Every fatal error is a 500.
    pub fn status_code(&self) -> u16 {
        500
    }
}

/// A non-fatal error for a single chunk.
///
/// The run continues; the chunk's text is absent from the combined output.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// Every attempt against the transformation backend failed.
    #[error("{chunk}: translation failed after {attempts} attempts: {detail}")]
    TransformFailed {
        chunk: String,
        attempts: u32,
        detail: String,
    },

    /// The worker task panicked before producing a result.
    #[error("{chunk}: worker panicked: {detail}")]
    WorkerPanicked { chunk: String, detail: String },
}

impl ChunkError {
    /// The short reason written to the failure log and report.
    pub fn reason(&self) -> &str {
        match self {
            ChunkError::TransformFailed { detail, .. } => detail,
            ChunkError::WorkerPanicked { detail, .. } => detail,
        }
    }
}

/// A single failed call to the transformation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The backend returned an error (network, HTTP status, content filter …).
    #[error("{0}")]
    Backend(String),

    /// The backend did not answer within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend answered with no text.
    #[error("empty response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_failure_display() {
        let e = ChunkError::TransformFailed {
            chunk: "pages_11-20".into(),
            attempts: 3,
            detail: "quota exceeded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pages_11-20"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert_eq!(e.reason(), "quota exceeded");
    }

    #[test]
    fn unsupported_extension_display() {
        let e = PipelineError::UnsupportedExtension {
            key: "scans/report.docx".into(),
            expected: "pdf".into(),
        };
        assert!(e.to_string().contains("report.docx"));
        assert!(e.to_string().contains(".pdf"));
    }

    #[test]
    fn configuration_missing_display() {
        let e = PipelineError::ConfigurationMissing {
            name: "DEST_BUCKET_NAME".into(),
            hint: "Set the destination location.".into(),
        };
        assert!(e.to_string().contains("DEST_BUCKET_NAME"));
        assert_eq!(e.status_code(), 500);
    }

    #[test]
    fn transform_timeout_display() {
        let e = TransformError::Timeout { secs: 30 };
        assert_eq!(e.to_string(), "timed out after 30s");
    }
}
