//! Pipeline stages for chunked PDF translation.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! partition ──▶ dispatch ──▶ worker (×N) ──▶ assemble
//!  (lopdf)     (bounded)    (retry, clean,   (page order)
//!                            relabel)
//! ```
//!
//! 1. [`partition`]: split the PDF into `pages_<s>-<e>` sub-documents
//! 2. [`dispatch`]: fan chunks out to at most `concurrency` worker tasks
//! 3. [`worker`]: call the transformer with retry/backoff; the only stage
//!    with network I/O
//! 4. [`postprocess`]: deterministic cleanup of backend quirks
//! 5. [`relabel`]: shift chunk-local page markers to global numbers
//! 6. [`assemble`]: reorder by chunk identity and concatenate

pub mod assemble;
pub mod dispatch;
pub mod partition;
pub mod postprocess;
pub mod relabel;
pub mod worker;
