//! The transformation capability: one chunk in, translated text out.
//!
//! The pipeline only knows the [`Transformer`] trait. [`LlmTransformer`] is the
//! production implementation on top of `edgequake-llm`; tests inject scripted
//! fakes through [`crate::config::PipelineConfigBuilder::transformer`].
//!
//! A transformer is invoked once per attempt. Retry, backoff and failure
//! bookkeeping belong to the worker ([`crate::pipeline::worker`]), not here.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, TransformError};
use crate::prompts::{render_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Model used when a provider is named (or auto-detected) without a model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// One attempt's input.
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    /// Chunk name (`pages_11-20`), for logging by the backend.
    pub chunk: &'a str,
    /// The serialised sub-document.
    pub bytes: &'a [u8],
    pub target_language: &'a str,
}

/// One successful attempt's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TransformOutput {
    /// Output without token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Black-box chunk translation backend.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        request: TransformRequest<'_>,
    ) -> Result<TransformOutput, TransformError>;
}

// ── LLM backend ──────────────────────────────────────────────────────────

/// Sends each chunk to a multimodal LLM as an inline PDF attachment.
///
/// ## Message Layout
///
/// 1. **System message**: the translation prompt, rendered for the target
///    language and a page-marker label the relabeler recognises
/// 2. **User message**: the chunk PDF as a base64 `application/pdf`
///    attachment with empty text; the attachment carries all the content
pub struct LlmTransformer {
    provider: Arc<dyn LLMProvider>,
    prompt_template: String,
    labels: Vec<String>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmTransformer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            prompt_template: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            labels: config.labels.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transformer for LlmTransformer {
    async fn transform(
        &self,
        request: TransformRequest<'_>,
    ) -> Result<TransformOutput, TransformError> {
        let prompt = render_prompt(&self.prompt_template, request.target_language, &self.labels);
        let attachment = ImageData::new(STANDARD.encode(request.bytes), "application/pdf");
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images("", vec![attachment]),
        ];
        let options = self.build_options();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| TransformError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| TransformError::Backend(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.chunk, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(TransformError::EmptyResponse);
        }

        Ok(TransformOutput {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve the transformer, from most-specific to least-specific:
///
/// 1. **Pre-built transformer** (`config.transformer`): used as-is.
/// 2. **Named provider + model** (`config.provider_name`): API key read from
///    the provider's usual environment variable.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`GEMINI_API_KEY`**: Gemini with [`DEFAULT_GEMINI_MODEL`]; Gemini reads
///    PDFs natively.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// No usable provider is a [`PipelineError::ConfigurationMissing`]; callers
/// resolve before any document I/O.
pub fn resolve_transformer(config: &PipelineConfig) -> Result<Arc<dyn Transformer>, PipelineError> {
    if let Some(ref transformer) = config.transformer {
        return Ok(Arc::clone(transformer));
    }

    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmTransformer::new(provider, config)))
}

fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| default_model(name).to_string());
        return create_provider(name, &model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            return create_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ConfigurationMissing {
            name: "LLM provider".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or another provider key) or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        PipelineError::ConfigurationMissing {
            name: format!("{name} provider"),
            hint: format!("{e}"),
        }
    })
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" | "azure" => "gpt-4.1-mini",
        "anthropic" => "claude-sonnet-4-20250514",
        "mistral" => "pixtral-12b-2409",
        "ollama" | "lmstudio" => "llava",
        _ => DEFAULT_GEMINI_MODEL,
    }
}
