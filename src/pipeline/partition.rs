//! Chunk partitioning: slice a paginated document into fixed-size page ranges.
//!
//! Partitioning is split in two so the arithmetic can be reasoned about on its
//! own:
//!
//! * [`plan_chunks`] (pure): `ceil(total / per_chunk)` contiguous ranges that
//!   cover `[1, total]` exactly, in ascending order.
//! * [`partition`]: materialises each range as an independent sub-document
//!   through the [`PagedDocument`] seam. Either every chunk is produced or the
//!   whole call fails; there is no partial partition.
//!
//! PDF splitting is CPU-bound, so [`partition_pdf`] runs it on the blocking
//! pool via `spawn_blocking`.

use crate::error::PipelineError;
use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// A 1-indexed, inclusive page range. Chunk identity is its `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

static RE_CHUNK_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"pages_(\d+)-(\d+)").unwrap());

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start >= 1 && start <= end, "bad range {start}-{end}");
        Self { start, end }
    }

    /// Number of pages in the range.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false; a range holds at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, page: usize) -> bool {
        (self.start..=self.end).contains(&page)
    }

    /// Chunk name used for logs, reports and file names: `pages_<start>-<end>`.
    pub fn name(&self) -> String {
        format!("pages_{}-{}", self.start, self.end)
    }

    /// Recover a range from anything containing a chunk name,
    /// e.g. `pages_11-20.pdf` or `/tmp/split/pages_1-10.txt`.
    pub fn from_name(name: &str) -> Option<Self> {
        let caps = RE_CHUNK_NAME.captures(name)?;
        let start: usize = caps[1].parse().ok()?;
        let end: usize = caps[2].parse().ok()?;
        (start >= 1 && start <= end).then_some(Self { start, end })
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pages_{}-{}", self.start, self.end)
    }
}

/// One chunk: its page range plus the serialised sub-document.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    pub range: PageRange,
    pub bytes: Vec<u8>,
}

impl Chunk {
    pub fn name(&self) -> String {
        self.range.name()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("range", &self.range)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A document that can report its page count and serialise a page range.
pub trait PagedDocument {
    fn page_count(&self) -> usize;

    /// Serialise exactly the pages of `range`, in original order.
    fn extract(&self, range: PageRange) -> Result<Vec<u8>, PipelineError>;
}

/// Compute the chunk ranges for a document of `total_pages`.
///
/// Chunk *i* spans `[i*k + 1, min((i+1)*k, total)]`. Returns an empty plan
/// when either argument is zero.
pub fn plan_chunks(total_pages: usize, pages_per_chunk: usize) -> Vec<PageRange> {
    if total_pages == 0 || pages_per_chunk == 0 {
        return Vec::new();
    }
    let count = total_pages.div_ceil(pages_per_chunk);
    (0..count)
        .map(|i| {
            let start = i * pages_per_chunk + 1;
            let end = ((i + 1) * pages_per_chunk).min(total_pages);
            PageRange::new(start, end)
        })
        .collect()
}

/// Materialise every chunk of `document`, in ascending page order.
pub fn partition<D: PagedDocument + ?Sized>(
    document: &D,
    pages_per_chunk: usize,
) -> Result<Vec<Chunk>, PipelineError> {
    if pages_per_chunk == 0 {
        return Err(PipelineError::InvalidConfig(
            "pages_per_chunk must be ≥ 1".into(),
        ));
    }
    let total = document.page_count();
    if total == 0 {
        return Err(PipelineError::EmptyDocument);
    }

    let plan = plan_chunks(total, pages_per_chunk);
    info!("Dividing {} pages into {} chunks", total, plan.len());

    plan.into_iter()
        .map(|range| {
            let bytes = document.extract(range)?;
            debug!("Materialised {} ({} bytes)", range, bytes.len());
            Ok(Chunk { range, bytes })
        })
        .collect()
}

// ── PDF backend ──────────────────────────────────────────────────────────

/// A parsed PDF held in memory.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: Document,
    page_count: usize,
}

impl PdfDocument {
    /// Parse PDF bytes, validating the `%PDF` magic first so callers get a
    /// meaningful error rather than a parser failure deep inside lopdf.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(PipelineError::InvalidDocument {
                detail: format!("not a PDF (first bytes: {:?})", magic),
            });
        }

        let inner = Document::load_mem(bytes).map_err(|e| PipelineError::InvalidDocument {
            detail: e.to_string(),
        })?;
        if inner.is_encrypted() {
            return Err(PipelineError::InvalidDocument {
                detail: "document is encrypted".into(),
            });
        }

        let page_count = inner.get_pages().len();
        if page_count == 0 {
            return Err(PipelineError::EmptyDocument);
        }
        Ok(Self { inner, page_count })
    }
}

impl PagedDocument for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn extract(&self, range: PageRange) -> Result<Vec<u8>, PipelineError> {
        if range.end > self.page_count {
            return Err(PipelineError::InvalidDocument {
                detail: format!(
                    "{} is out of range (document has {} pages)",
                    range, self.page_count
                ),
            });
        }

        let mut doc = self.inner.clone();
        let outside: Vec<u32> = (1..=self.page_count)
            .filter(|p| !range.contains(*p))
            .map(|p| p as u32)
            .collect();
        doc.delete_pages(&outside);
        doc.prune_objects();
        doc.renumber_objects();

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| PipelineError::InvalidDocument {
                detail: format!("failed to serialise {}: {}", range, e),
            })?;
        Ok(buf)
    }
}

/// Parse `bytes` as a PDF and partition it on the blocking thread pool.
///
/// Returns the document's page count alongside its chunks.
pub async fn partition_pdf(
    bytes: Vec<u8>,
    pages_per_chunk: usize,
) -> Result<(usize, Vec<Chunk>), PipelineError> {
    tokio::task::spawn_blocking(move || {
        let document = PdfDocument::from_bytes(&bytes)?;
        let chunks = partition(&document, pages_per_chunk)?;
        Ok((document.page_count(), chunks))
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Partition task panicked: {}", e)))?
}

/// Count the pages of a PDF without splitting it.
pub async fn count_pdf_pages(bytes: Vec<u8>) -> Result<usize, PipelineError> {
    tokio::task::spawn_blocking(move || PdfDocument::from_bytes(&bytes).map(|d| d.page_count()))
        .await
        .map_err(|e| PipelineError::Internal(format!("Page-count task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pages are plain strings; a chunk serialises to its pages joined by '\n'.
    struct TextDocument(Vec<String>);

    impl TextDocument {
        fn with_pages(n: usize) -> Self {
            Self((1..=n).map(|i| format!("p{i}")).collect())
        }
    }

    impl PagedDocument for TextDocument {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn extract(&self, range: PageRange) -> Result<Vec<u8>, PipelineError> {
            Ok(self.0[range.start - 1..range.end].join("\n").into_bytes())
        }
    }

    #[test]
    fn plan_covers_every_page_exactly_once() {
        for total in 1..=40 {
            for k in 1..=12 {
                let plan = plan_chunks(total, k);
                assert_eq!(plan.len(), total.div_ceil(k), "P={total} K={k}");
                assert_eq!(plan[0].start, 1);
                assert_eq!(plan.last().unwrap().end, total);
                for pair in plan.windows(2) {
                    assert_eq!(pair[0].end + 1, pair[1].start, "gap/overlap P={total} K={k}");
                }
                assert!(plan.iter().all(|r| r.len() <= k));
            }
        }
    }

    #[test]
    fn small_document_yields_single_chunk() {
        assert_eq!(plan_chunks(7, 10), vec![PageRange::new(1, 7)]);
        assert_eq!(plan_chunks(10, 10), vec![PageRange::new(1, 10)]);
        assert_eq!(plan_chunks(1, 10), vec![PageRange::new(1, 1)]);
    }

    #[test]
    fn twenty_five_pages_by_ten() {
        let names: Vec<String> = plan_chunks(25, 10).iter().map(PageRange::name).collect();
        assert_eq!(names, vec!["pages_1-10", "pages_11-20", "pages_21-25"]);
    }

    #[test]
    fn degenerate_plans_are_empty() {
        assert!(plan_chunks(0, 10).is_empty());
        assert!(plan_chunks(10, 0).is_empty());
    }

    #[test]
    fn partition_materialises_pages_in_order() {
        let doc = TextDocument::with_pages(5);
        let chunks = partition(&doc, 2).unwrap();
        let bodies: Vec<String> = chunks
            .iter()
            .map(|c| String::from_utf8(c.bytes.clone()).unwrap())
            .collect();
        assert_eq!(bodies, vec!["p1\np2", "p3\np4", "p5"]);
        assert_eq!(chunks[2].name(), "pages_5-5");
    }

    #[test]
    fn partition_rejects_empty_document() {
        let doc = TextDocument(Vec::new());
        assert!(matches!(
            partition(&doc, 10),
            Err(PipelineError::EmptyDocument)
        ));
    }

    #[test]
    fn range_name_round_trips_through_file_names() {
        assert_eq!(
            PageRange::from_name("/tmp/split/pages_11-19.txt"),
            Some(PageRange::new(11, 19))
        );
        assert_eq!(PageRange::from_name("chapter-3.pdf"), None);
        assert_eq!(PageRange::from_name("pages_9-3"), None);
        assert_eq!(PageRange::new(21, 25).to_string(), "pages_21-25");
    }

    #[test]
    fn non_pdf_bytes_are_invalid() {
        let err = PdfDocument::from_bytes(b"hello world").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDocument { .. }));
    }

    #[test]
    fn truncated_pdf_is_invalid() {
        let err = PdfDocument::from_bytes(b"%PDF-1.5\n%garbage").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidDocument { .. } | PipelineError::EmptyDocument
        ));
    }
}
