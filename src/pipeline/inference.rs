//! Inference seam: send one instruction plus a batch of images, get text back.
//!
//! The engine talks to the model only through [`InferenceService`]. The
//! production implementation, [`LlmInference`], forwards to any
//! `edgequake-llm` provider; tests substitute a scripted service. Retry,
//! backoff and timeout are applied by the engine around whichever service
//! is plugged in, so implementations only need to make a single attempt.

use crate::config::ExtractionConfig;
use crate::error::TimesheetError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// One extraction call: the instruction and up to `batch_size` images.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub instruction: String,
    pub images: Vec<ImageData>,
}

/// Raw reply from the inference service.
#[derive(Debug, Clone, Default)]
pub struct InferenceResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl InferenceResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// A vision-capable model endpoint.
///
/// The returned text is untrusted: no schema is enforced on the service
/// side. Errors are plain strings because the engine only logs them and
/// skips the batch.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn infer(&self, request: &ExtractionRequest) -> Result<InferenceResponse, String>;
}

/// [`InferenceService`] backed by an `edgequake-llm` provider.
pub struct LlmInference {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmInference {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, TimesheetError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl InferenceService for LlmInference {
    async fn infer(&self, request: &ExtractionRequest) -> Result<InferenceResponse, String> {
        // Instruction and images travel in a single user turn.
        let messages = vec![ChatMessage::user_with_images(
            request.instruction.as_str(),
            request.images.clone(),
        )];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| e.to_string())?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(InferenceResponse {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TimesheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TimesheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Anthropic key present** (`ANTHROPIC_API_KEY`): Anthropic with the
///    configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, TimesheetError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("anthropic", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TimesheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
