//! Append-only log of chunks that exhausted their retries.
//!
//! Each line reads `<chunk> failed: <reason>`. Workers append concurrently,
//! so every write goes through one async mutex; lines never interleave.
//!
//! Appending is fire-and-forget: an I/O error is logged with `warn!` and
//! swallowed, so a broken log can never abort a run.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared failure sink. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct FailureLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl FailureLog {
    /// A log appending to `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lock: Mutex::new(()),
        }
    }

    /// A log that drops every entry.
    pub fn disabled() -> Self {
        Self {
            path: None,
            lock: Mutex::new(()),
        }
    }

    pub fn from_option(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::new(p),
            None => Self::disabled(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one entry. Never fails.
    pub async fn record(&self, chunk: &str, reason: &str) {
        let Some(ref path) = self.path else {
            return;
        };
        let line = format_entry(chunk, reason);

        let _guard = self.lock.lock().await;
        if let Err(e) = append_line(path, &line).await {
            warn!("Could not write failure log '{}': {}", path.display(), e);
        } else {
            debug!("Recorded failure of {} in {}", chunk, path.display());
        }
    }
}

/// Format one log line. Newlines in the reason are flattened so each entry
/// stays on a single line.
pub fn format_entry(chunk: &str, reason: &str) -> String {
    let reason = reason.replace(['\r', '\n'], " ");
    format!("{} failed: {}\n", chunk, reason.trim())
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn entry_format() {
        assert_eq!(
            format_entry("pages_11-20", "HTTP 503\nretry later"),
            "pages_11-20 failed: HTTP 503 retry later\n"
        );
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("errors.log");
        let log = Arc::new(FailureLog::new(&path));

        let mut handles = Vec::new();
        for i in 0..32 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let chunk = format!("pages_{}-{}", i * 10 + 1, i * 10 + 10);
                log.record(&chunk, "quota exceeded").await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 32);
        assert!(lines
            .iter()
            .all(|l| l.starts_with("pages_") && l.ends_with(" failed: quota exceeded")));
    }

    #[tokio::test]
    async fn unwritable_log_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let log = FailureLog::new(dir.path());
        log.record("pages_1-10", "boom").await;
    }

    #[tokio::test]
    async fn disabled_log_writes_nothing() {
        let log = FailureLog::disabled();
        assert!(log.path().is_none());
        log.record("pages_1-10", "boom").await;
    }
}
