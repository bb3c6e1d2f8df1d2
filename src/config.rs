//! Configuration types for chunked PDF translation.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config and its [`RetryPolicy`] are the
//! only process-wide state; both are read-only once a run starts, so a single
//! config can be shared by any number of concurrent runs.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use crate::transform::Transformer;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fallback worker count when the platform cannot report its parallelism.
pub const FALLBACK_CONCURRENCY: usize = 4;

/// Label words recognised in front of page numbers unless overridden.
pub const DEFAULT_LABELS: [&str; 2] = ["page", "صفحة"];

/// Configuration for one chunked translation run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf_translate::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .pages_per_chunk(10)
///     .concurrency(4)
///     .target_language("French")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pages per chunk. The last chunk may be smaller. Default: 10.
    ///
    /// Ten pages keeps each request well inside typical model context limits
    /// while giving the backend enough surrounding text to translate coherently.
    pub pages_per_chunk: usize,

    /// Maximum number of chunks in flight at once.
    /// Default: available parallelism, or [`FALLBACK_CONCURRENCY`].
    pub concurrency: usize,

    /// Attempts and backoff for each chunk.
    pub retry: RetryPolicy,

    /// Language the backend is asked to translate into. Default: "Arabic".
    pub target_language: String,

    /// Page-marker label words, matched case-insensitively. Default: [`DEFAULT_LABELS`].
    pub labels: Vec<String>,

    /// Separator placed between chunk texts in the combined output.
    pub chunk_separator: ChunkSeparator,

    /// Run the deterministic text cleanup on each chunk. Default: true.
    pub clean_output: bool,

    /// Append-only log receiving one line per exhausted chunk. Default: `errors.log`.
    /// `None` disables the log.
    pub failure_log: Option<PathBuf>,

    /// LLM model identifier. If None, the provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed transformer. Takes precedence over `provider_name`.
    pub transformer: Option<Arc<dyn Transformer>>,

    /// Custom system prompt. If None, uses the built-in translation prompt.
    pub system_prompt: Option<String>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per chunk. Default: 8192.
    ///
    /// A translated ten-page chunk routinely runs past 4 000 tokens.
    pub max_tokens: usize,

    /// Per-call timeout for the backend in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer for run and chunk events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: 10,
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
            target_language: "Arabic".to_string(),
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            chunk_separator: ChunkSeparator::default(),
            clean_output: true,
            failure_log: Some(PathBuf::from("errors.log")),
            model: None,
            provider_name: None,
            transformer: None,
            system_prompt: None,
            temperature: 0.1,
            max_tokens: 8192,
            api_timeout_secs: 300,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("pages_per_chunk", &self.pages_per_chunk)
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry)
            .field("target_language", &self.target_language)
            .field("labels", &self.labels)
            .field("chunk_separator", &self.chunk_separator)
            .field("clean_output", &self.clean_output)
            .field("failure_log", &self.failure_log)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("transformer", &self.transformer.as_ref().map(|_| "<dyn Transformer>"))
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn TranslationProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Available parallelism, or [`FALLBACK_CONCURRENCY`] when it cannot be detected.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_CONCURRENCY)
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.config.target_language = language.into();
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_separator(mut self, sep: ChunkSeparator) -> Self {
        self.config.chunk_separator = sep;
        self
    }

    pub fn clean_output(mut self, v: bool) -> Self {
        self.config.clean_output = v;
        self
    }

    pub fn failure_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.failure_log = Some(path.into());
        self
    }

    pub fn no_failure_log(mut self) -> Self {
        self.config.failure_log = None;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.config.transformer = Some(transformer);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.pages_per_chunk == 0 {
            return Err(PipelineError::InvalidConfig(
                "pages_per_chunk must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.labels.iter().all(|l| l.trim().is_empty()) {
            return Err(PipelineError::InvalidConfig(
                "At least one page-marker label is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Attempt budget and backoff for a single chunk.
///
/// The wait between attempts is `base_delay + uniform(0, jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 3.
    pub max_attempts: u32,
    /// Fixed part of the wait between attempts. Default: 5 s.
    pub base_delay: Duration,
    /// Upper bound of the random part of the wait. Default: 3 s.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            jitter: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately. Mostly useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Draw the wait before the next attempt.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.base_delay + Duration::from_millis(extra)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate chunk texts in the combined output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkSeparator {
    /// Each chunk framed by blank lines, nothing else. (default)
    #[default]
    None,
    /// Horizontal rule between chunks: "---"
    HorizontalRule,
    /// HTML comment naming the next chunk: "<!-- pages_11-20 -->"
    Comment,
    /// Custom string inserted between chunks.
    Custom(String),
}

impl ChunkSeparator {
    /// Render the separator placed before the chunk called `chunk_name`.
    pub fn render(&self, chunk_name: &str) -> String {
        match self {
            ChunkSeparator::None => String::new(),
            ChunkSeparator::HorizontalRule => "---".to_string(),
            ChunkSeparator::Comment => format!("<!-- {} -->", chunk_name),
            ChunkSeparator::Custom(s) => s.clone(),
        }
    }
}
