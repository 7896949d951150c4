//! Public extraction entry points.
//!
//! [`Extractor`] owns the collaborators and runs the stages in order:
//! page text → translation → aggregation → per-section resolution. The free
//! functions build an [`Extractor`] from an [`ExtractionConfig`] and are what
//! most callers need.

use crate::answer::{FallbackSource, GatedSource, LocalSource};
use crate::client::{EntityExtractor, GenerativeClient, KeyValueExtractor, LlmClient, RetryingClient};
use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::ExtractError;
use crate::output::{
    ExtractionOutput, ExtractionReport, ExtractionStats, ExtractionStatus, PageReport,
};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::assemble::Assembler;
use crate::pipeline::translate::translate_pages;
use crate::pipeline::{input, text};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A configured pipeline, reusable across documents.
pub struct Extractor {
    client: Arc<dyn GenerativeClient>,
    source: GatedSource<LocalSource, FallbackSource>,
    config: ExtractionConfig,
}

impl Extractor {
    /// Build from explicit collaborators. Every generative call goes through
    /// `config.retry`.
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        extractor: Arc<dyn EntityExtractor>,
        config: ExtractionConfig,
    ) -> Self {
        let client: Arc<dyn GenerativeClient> =
            Arc::new(RetryingClient::new(client, config.retry));
        let source = GatedSource::new(
            LocalSource::new(extractor),
            FallbackSource::new(Arc::clone(&client)),
            config.confidence_threshold,
        );
        Self {
            client,
            source,
            config,
        }
    }

    /// Build from configuration, resolving the LLM provider.
    pub async fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(config).await?;
        info!(
            "Using provider {} / {}",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("default model")
        );

        let client: Arc<dyn GenerativeClient> = Arc::new(LlmClient::new(provider, config));
        let extractor = config
            .entity_extractor
            .clone()
            .unwrap_or_else(|| Arc::new(KeyValueExtractor));
        Ok(Self::new(client, extractor, config.clone()))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract from a local path or URL.
    pub async fn process(&self, input_str: &str) -> Result<ExtractionOutput, ExtractError> {
        info!("Starting extraction: {}", input_str);
        let resolved =
            input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        let pages =
            text::extract_page_texts(resolved.path(), self.config.password.as_deref()).await?;
        self.process_pages(pages).await
    }

    /// Run the pipeline over already-extracted page texts.
    pub async fn process_pages(&self, pages: Vec<String>) -> Result<ExtractionOutput, ExtractError> {
        let total_start = Instant::now();
        let progress = self.config.progress_callback.as_deref();
        let schema = self.config.schema.as_ref();
        let section_names = schema.section_names();

        if let Some(cb) = progress {
            cb.on_extraction_start(pages.len());
        }

        // ── Translate ────────────────────────────────────────────────────
        let translate_start = Instant::now();
        let translated = translate_pages(
            self.client.as_ref(),
            &pages,
            self.config.translate_concurrency,
            progress,
        )
        .await?;
        let translate_duration_ms = translate_start.elapsed().as_millis() as u64;

        // ── Aggregate ────────────────────────────────────────────────────
        let aggregate_start = Instant::now();
        let sections = aggregate(self.client.as_ref(), &translated, &section_names).await?;
        let aggregate_duration_ms = aggregate_start.elapsed().as_millis() as u64;

        let missing: Vec<String> = section_names
            .iter()
            .filter(|name| !sections.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            debug!("Sections with no text: {:?}", missing);
        }
        if let Some(cb) = progress {
            cb.on_sections_aggregated(sections.len(), section_names.len());
        }

        // ── Resolve ──────────────────────────────────────────────────────
        let resolve_start = Instant::now();
        let assembled = Assembler::new(&self.source, self.client.as_ref(), progress)
            .assemble(schema, &sections)
            .await;
        let resolve_duration_ms = resolve_start.elapsed().as_millis() as u64;

        if let Some(cb) = progress {
            cb.on_extraction_complete(section_names.len(), assembled.failures.len());
        }

        let report = ExtractionReport {
            status: if assembled.failures.is_empty() {
                ExtractionStatus::Complete
            } else {
                ExtractionStatus::Partial
            },
            pages: translated
                .iter()
                .map(|p| PageReport {
                    page_num: p.page_num,
                    language: p.language.clone(),
                    input_chars: p.input_chars,
                    translated_chars: p.text.chars().count(),
                })
                .collect(),
            sections_found: sections.names(),
            missing_sections: missing,
            failed_sections: assembled.failures,
        };

        let counts = assembled.counts;
        let stats = ExtractionStats {
            total_pages: pages.len(),
            blank_pages: translated.iter().filter(|p| p.is_blank()).count(),
            sections_resolved: counts.sections_resolved,
            fields_resolved: counts.fields_resolved,
            local_answers: counts.local_answers,
            fallback_answers: counts.fallback_answers,
            list_entries: counts.list_entries,
            translate_duration_ms,
            aggregate_duration_ms,
            resolve_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction {:?}: {} fields ({} local, {} fallback), {}ms total",
            report.status,
            stats.fields_resolved,
            stats.local_answers,
            stats.fallback_answers,
            stats.total_duration_ms
        );

        Ok(ExtractionOutput {
            record: assembled.record,
            report,
            stats,
        })
    }
}

/// Extract shipment data from a PDF file or URL.
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors: unreadable input,
/// no provider, or a page that could not be translated or classified.
/// A section that fails is reported in `output.report` instead.
///
/// # Example
/// ```rust,no_run
/// use edgequake_freight::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = extract("booking.pdf", &ExtractionConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&output.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::from_config(config)
        .await?
        .process(input_str.as_ref())
        .await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Extract and write the record JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let output = extract(input_str, config).await?;
    write_json_atomic(output_path.as_ref(), &output.record).await?;
    Ok(output)
}

/// Extract from PDF bytes in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed on return.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    extract(&path, config).await
}

/// Serialize `value` as pretty JSON and move it into place at `path`.
pub async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), ExtractError> {
    let write_failed = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| ExtractError::Internal(format!("JSON serialisation failed: {e}")))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GROQ_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
