//! Configuration for shipment extraction.
//!
//! Every knob lives in [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The schema, the local extractor and the
//! provider are all injectable here, which is how tests swap in stubs and
//! how callers run the pipeline over a schema of their own.

use crate::client::entity::EntityExtractor;
use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_TARGET_LANGUAGE;
use crate::schema::Schema;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

pub use crate::client::retry::RetryPolicy;

/// Default confidence gate: local answers scoring below this go to the fallback.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Configuration for one or many extractions.
///
/// # Example
/// ```rust
/// use edgequake_freight::{ExtractionConfig, RetryPolicy};
///
/// let config = ExtractionConfig::builder()
///     .confidence_threshold(0.85)
///     .retry(RetryPolicy::new(3, 500))
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] for named
    /// providers and the provider default otherwise.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "groq", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for every generative call. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 2048.
    ///
    /// Translation echoes a whole page back, so this must cover the longest
    /// page; 2048 fits a dense booking confirmation page.
    pub max_tokens: usize,

    /// Retry policy applied to every generative call. Default: 3 attempts, 1 s apart.
    pub retry: RetryPolicy,

    /// Local answers scoring below this escalate to the fallback. Default: 0.9.
    pub confidence_threshold: f64,

    /// Language pages are translated into. Default: English.
    pub target_language: String,

    /// Pages translated at once. Output order is page order regardless. Default: 1.
    pub translate_concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// The extraction schema. Default: [`Schema::freight`].
    pub schema: Arc<Schema>,

    /// Local extractor. None uses [`crate::client::KeyValueExtractor`].
    pub entity_extractor: Option<Arc<dyn EntityExtractor>>,

    /// Receives stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            retry: RetryPolicy::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            translate_concurrency: 1,
            password: None,
            download_timeout_secs: 120,
            schema: Arc::new(Schema::freight().clone()),
            entity_extractor: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("target_language", &self.target_language)
            .field("translate_concurrency", &self.translate_concurrency)
            .field("sections", &self.schema.section_names())
            .field(
                "entity_extractor",
                &self.entity_extractor.as_ref().map(|_| "<dyn EntityExtractor>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
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

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.delay_ms = ms;
        self
    }

    pub fn confidence_threshold(mut self, t: f64) -> Self {
        self.config.confidence_threshold = t;
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn translate_concurrency(mut self, n: usize) -> Self {
        self.config.translate_concurrency = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.config.schema = Arc::new(schema);
        self
    }

    pub fn entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.config.entity_extractor = Some(extractor);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(ExtractError::InvalidConfig(format!(
                "Confidence threshold must be within 0–1, got {}",
                c.confidence_threshold
            )));
        }
        if c.retry.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "Retry policy needs at least 1 attempt".into(),
            ));
        }
        if c.translate_concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "Translate concurrency must be ≥ 1".into(),
            ));
        }
        if c.target_language.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
