//! Event-triggered invocation: translate one uploaded object.
//!
//! An object-store notification names the uploaded document (bucket + key).
//! [`handle_event`] fetches it through an [`ObjectStore`], runs the pipeline,
//! and stores the combined text under the same key with a `.txt` extension in
//! the destination bucket. The outcome is folded into a [`StatusResponse`]:
//! 200 whenever the run reached reassembly (possibly partial), 500 for any
//! fatal error.
//!
//! ```json
//! { "Records": [ { "s3": { "bucket": { "name": "uploads" },
//!                          "object": { "key": "books/novel.pdf" } } } ] }
//! ```

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::PipelineReport;
use crate::transform::resolve_transformer;
use crate::translate::Pipeline;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{error, info, warn};

/// Required source extension (compared case-insensitively).
pub const SOURCE_EXTENSION: &str = "pdf";
/// Extension of the stored result.
pub const OUTPUT_EXTENSION: &str = "txt";

// ── Event shape ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub s3: ObjectNotification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectNotification {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
}

impl TriggerEvent {
    /// Build a single-record event.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            records: vec![EventRecord {
                s3: ObjectNotification {
                    bucket: BucketRef { name: bucket.into() },
                    object: ObjectRef { key: key.into() },
                },
            }],
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(raw).map_err(|e| PipelineError::InvalidEvent(e.to_string()))
    }

    /// Source bucket and key of the first record. Further records are ignored.
    pub fn source(&self) -> Result<(&str, &str), PipelineError> {
        let record = self
            .records
            .first()
            .ok_or_else(|| PipelineError::InvalidEvent("event has no records".into()))?;
        let bucket = record.s3.bucket.name.as_str();
        let key = record.s3.object.key.as_str();
        if bucket.is_empty() || key.is_empty() {
            return Err(PipelineError::InvalidEvent(
                "record has an empty bucket or key".into(),
            ));
        }
        Ok((bucket, key))
    }
}

// ── Settings ─────────────────────────────────────────────────────────────

/// Deployment settings for the trigger surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSettings {
    /// Where results are stored (`DEST_BUCKET_NAME`).
    pub dest_bucket: String,
    /// Overrides the config's target language when set (`TARGET_LANGUAGE`).
    pub target_language: Option<String>,
    /// Root directory of the [`LocalObjectStore`] (`PDF_TRANSLATE_STORE_ROOT`).
    pub store_root: PathBuf,
}

impl EventSettings {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, so callers and tests can supply their
    /// own environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let dest_bucket =
            non_empty("DEST_BUCKET_NAME").ok_or_else(|| PipelineError::ConfigurationMissing {
                name: "DEST_BUCKET_NAME".into(),
                hint: "Set DEST_BUCKET_NAME to the bucket that receives translated text.".into(),
            })?;

        Ok(Self {
            dest_bucket,
            target_language: non_empty("TARGET_LANGUAGE"),
            store_root: non_empty("PDF_TRANSLATE_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

// ── Object store ─────────────────────────────────────────────────────────

/// Retrieval and storage of whole documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Failures are [`PipelineError::SourceUnavailable`].
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError>;

    /// Store an object, replacing any existing one. Failures are
    /// [`PipelineError::SinkUnavailable`].
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), PipelineError>;
}

/// An [`ObjectStore`] over a directory tree: `(bucket, key)` lives at
/// `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a bucket/key pair to a path under the root.
    ///
    /// Only plain path segments are accepted; `..`, absolute keys and the like
    /// would escape the root.
    pub fn object_path(&self, bucket: &str, key: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            if part.is_empty()
                || !rel
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
            {
                return None;
            }
            path.push(rel);
        }
        Some(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        let location = format!("{bucket}/{key}");
        let path = self
            .object_path(bucket, key)
            .ok_or_else(|| PipelineError::SourceUnavailable {
                location: location.clone(),
                reason: "key escapes the store root".into(),
            })?;

        info!("Fetching {} from {}", key, bucket);
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::SourceUnavailable {
                location,
                reason: e.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), PipelineError> {
        let location = format!("{bucket}/{key}");
        let path = self
            .object_path(bucket, key)
            .ok_or_else(|| PipelineError::SinkUnavailable {
                location: location.clone(),
                reason: "key escapes the store root".into(),
            })?;

        info!("Storing {} bytes as {} in {}", body.len(), key, bucket);
        tokio::task::spawn_blocking(move || write_object(&path, &body))
            .await
            .map_err(|e| PipelineError::Internal(format!("store task panicked: {e}")))?
            .map_err(|e| PipelineError::SinkUnavailable {
                location,
                reason: e.to_string(),
            })
    }
}

/// Write through a sibling temp file so readers never see a partial object.
fn write_object(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(body)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ── Handler ──────────────────────────────────────────────────────────────

/// Outcome of one triggered run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded message.
    pub body: String,
}

impl StatusResponse {
    fn new(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: serde_json::Value::String(message.to_string()).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// The destination key for `key`: same path, `.txt` extension.
///
/// `books/novel.pdf` → `books/novel.txt`; a key without an extension simply
/// gains one.
pub fn derive_output_key(key: &str) -> String {
    let name_start = key.rfind('/').map_or(0, |i| i + 1);
    let stem_end = match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => name_start + dot,
        _ => key.len(),
    };
    format!("{}.{}", &key[..stem_end], OUTPUT_EXTENSION)
}

/// Whether `key` ends in `.pdf`, ignoring case.
pub fn has_source_extension(key: &str) -> bool {
    Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXTENSION))
}

/// Translate the object named by `event` and report the outcome.
pub async fn handle_event(
    event: &TriggerEvent,
    settings: &EventSettings,
    store: &dyn ObjectStore,
    config: &PipelineConfig,
) -> StatusResponse {
    match process_event(event, settings, store, config).await {
        Ok((key, report)) => {
            let mut message = format!("Successfully translated file: {key}");
            if report.failed > 0 {
                message.push_str(&format!(
                    " ({} of {} chunks failed: {})",
                    report.failed,
                    report.total_chunks,
                    report.failed_chunks().collect::<Vec<_>>().join(", ")
                ));
            }
            StatusResponse::new(200, &message)
        }
        Err(e) => {
            error!("Error: {}", e);
            StatusResponse::new(e.status_code(), &format!("Error processing file: {e}"))
        }
    }
}

/// [`handle_event`] without the status folding: the processed key and the run
/// report, or the fatal error.
pub async fn process_event(
    event: &TriggerEvent,
    settings: &EventSettings,
    store: &dyn ObjectStore,
    config: &PipelineConfig,
) -> Result<(String, PipelineReport), PipelineError> {
    let (bucket, key) = event.source()?;

    let mut config = config.clone();
    if let Some(ref language) = settings.target_language {
        config.target_language = language.clone();
    }
    let transformer = resolve_transformer(&config)?;

    if !has_source_extension(key) {
        return Err(PipelineError::UnsupportedExtension {
            key: key.to_string(),
            expected: SOURCE_EXTENSION.to_string(),
        });
    }

    let bytes = store.get(bucket, key).await?;
    let output = Pipeline::new(config, transformer).run(bytes).await?;
    if output.report.succeeded == 0 {
        warn!("No chunk of {} was translated; storing an empty result", key);
    }

    let output_key = derive_output_key(key);
    store
        .put(&settings.dest_bucket, &output_key, output.text.into_bytes())
        .await?;

    let mut report = output.report;
    report.output = Some(format!("{}/{}", settings.dest_bucket, output_key));
    Ok((key.to_string(), report))
}
