//! Configuration types for timesheet extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct holds every knob so a
//! config can be shared between the engine, the file worker and the job
//! orchestrator without each of them growing its own parameter list.

use crate::error::TimesheetError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const MAX_RETRIES: u32 = 10;

/// Configuration for extracting timesheets from documents.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use timesheet_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .batch_size(4)
///     .file_pause_ms(500)
///     .model("claude-sonnet-4-20250514")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Maximum number of images sent in one inference request. Range: 1–16. Default: 4.
    ///
    /// Smaller batches bound the request payload and limit how many entries
    /// are lost when a single reply is malformed.
    pub batch_size: usize,

    /// Longest side, in pixels, of a normalised image. Default: 1500.
    pub max_image_dimension: u32,

    /// JPEG quality used when encoding images for transmission. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// LLM model identifier, e.g. "claude-sonnet-4-20250514", "gpt-4.1".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per batch. Default: 2000.
    pub max_tokens: usize,

    /// Retry attempts on a failed inference call. Range: 0–10. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-inference-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Pause between two files of the same job, in milliseconds. Default: 1000.
    ///
    /// Files inside a job are processed one at a time; the pause keeps a
    /// long job under the provider's request-rate limit.
    pub file_pause_ms: u64,

    /// Custom extraction instruction. If None, uses the built-in prompt.
    pub instruction: Option<String>,

    /// File name suffixes accepted on submission (lower-case, with dot).
    pub accepted_extensions: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            max_image_dimension: 1500,
            jpeg_quality: 90,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2000,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            file_pause_ms: 1000,
            instruction: None,
            accepted_extensions: vec![".docx".to_string(), ".doc".to_string()],
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("batch_size", &self.batch_size)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("file_pause_ms", &self.file_pause_ms)
            .field("accepted_extensions", &self.accepted_extensions)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The pause observed between two files of a job.
    pub fn file_pause(&self) -> Duration {
        Duration::from_millis(self.file_pause_ms)
    }

    /// `true` if `file_name` ends with one of the accepted extensions.
    pub fn accepts(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.clamp(1, 16);
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(64);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
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

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn file_pause_ms(mut self, ms: u64) -> Self {
        self.config.file_pause_ms = ms;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn accepted_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.accepted_extensions = exts
            .into_iter()
            .map(|e| normalise_extension(&e.into()))
            .collect();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, TimesheetError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(TimesheetError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(TimesheetError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(TimesheetError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.accepted_extensions.is_empty() {
            return Err(TimesheetError::InvalidConfig(
                "At least one accepted extension is required".into(),
            ));
        }
        Ok(self.config)
    }
}

fn normalise_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}
