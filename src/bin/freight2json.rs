//! CLI binary for edgequake-freight.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the extracted record.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_freight::extract::write_json_atomic;
use edgequake_freight::progress::ProgressCallback;
use edgequake_freight::{
    extract, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback, NullExtractor,
    RetryPolicy, Schema,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar covering both halves of the run: every page translated, then
/// every section resolved.
struct CliProgressCallback {
    bar: ProgressBar,
    sections: usize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(sections: usize) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            sections,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} steps  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages + self.sections);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting from {total_pages} pages…"))
        ));
    }

    fn on_page_translated(&self, page_num: usize, total: usize, language: Option<&str>) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(language.unwrap_or("blank")),
        ));
        self.bar.inc(1);
    }

    fn on_sections_aggregated(&self, found: usize, total: usize) {
        self.bar.set_prefix("Resolving");
        self.bar
            .println(format!("  {} {found}/{total} sections found", cyan("◆")));
    }

    fn on_section_start(&self, section: &str) {
        self.bar.set_message(section.to_string());
    }

    fn on_section_complete(&self, section: &str, fields: usize) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            section,
            dim(&format!("{fields} fields")),
        ));
        self.bar.inc(1);
    }

    fn on_section_error(&self, section: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<22} {}", red("✗"), section, red(&msg)));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_sections: usize, failed_sections: usize) {
        self.bar.finish_and_clear();
        let ok = total_sections.saturating_sub(failed_sections);
        if failed_sections == 0 {
            eprintln!(
                "{} {} sections extracted",
                green("✔"),
                bold(&ok.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} sections extracted  ({} failed)",
                cyan("⚠"),
                bold(&ok.to_string()),
                total_sections,
                red(&failed_sections.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract to stdout
  freight2json booking.pdf

  # Extract to file
  freight2json booking.pdf -o booking.json

  # Record plus report and stats
  freight2json --report booking.pdf > run.json

  # Use a specific provider and model
  freight2json --provider openai --model gpt-4.1-mini booking.pdf

  # Always ask the LLM (skip the local extractor)
  freight2json --no-local booking.pdf

  # Custom schema
  freight2json --print-schema > schema.json
  freight2json --schema schema.json booking.pdf

ENVIRONMENT VARIABLES:
  GROQ_API_KEY            Groq API key (default model llama-3.1-8b-instant)
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (groq, openai, anthropic, ollama, …)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Extract structured shipment data from freight PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "freight2json",
    version,
    about = "Extract structured shipment data from freight PDFs as JSON",
    long_about = "Extract booking, route, cargo, vessel and party details from freight-forwarding \
PDFs (local files or URLs). Every field comes with a confidence score. A local extractor answers \
what it can; an LLM answers the rest.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "print_schema")]
    input: Option<String>,

    /// Write the record JSON to this file instead of stdout.
    #[arg(short, long, env = "FREIGHT_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (default for named providers: llama-3.1-8b-instant).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: groq, openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// JSON schema file replacing the built-in freight schema.
    #[arg(long, env = "FREIGHT_SCHEMA")]
    schema: Option<PathBuf>,

    /// Local answers scoring below this go to the LLM (0.0–1.0).
    #[arg(long, env = "FREIGHT_THRESHOLD", default_value_t = 0.9)]
    threshold: f64,

    /// Attempts per LLM call, including the first.
    #[arg(long, env = "FREIGHT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Pause between attempts in milliseconds.
    #[arg(long, env = "FREIGHT_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FREIGHT_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "FREIGHT_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Pages translated at once.
    #[arg(long, env = "FREIGHT_TRANSLATE_CONCURRENCY", default_value_t = 1)]
    translate_concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FREIGHT_PASSWORD")]
    password: Option<String>,

    /// Print record, report and stats instead of the record alone.
    #[arg(long, env = "FREIGHT_REPORT")]
    report: bool,

    /// Skip the local extractor; every field goes to the LLM.
    #[arg(long, env = "FREIGHT_NO_LOCAL")]
    no_local: bool,

    /// Directory with a GLiNER `model.onnx` and `tokenizer.json` to use as
    /// the local extractor.
    #[cfg(feature = "onnx")]
    #[arg(long, env = "FREIGHT_NER_MODEL", conflicts_with = "no_local")]
    ner_model: Option<PathBuf>,

    /// Print the active schema as JSON and exit.
    #[arg(long)]
    print_schema: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FREIGHT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "FREIGHT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FREIGHT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FREIGHT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would tear the progress bar, so it implies `error`.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.print_schema;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let schema = load_schema(&cli).await?;

    if cli.print_schema {
        println!(
            "{}",
            serde_json::to_string_pretty(&schema.to_json_value())
                .context("Failed to serialise schema")?
        );
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF path or URL is required")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(schema.sections().len());
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, schema, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&input, &config)
        .await
        .context("Extraction failed")?;

    if let Some(ref output_path) = cli.output {
        if cli.report {
            write_json_atomic(output_path, &output).await
        } else {
            write_json_atomic(output_path, &output.record).await
        }
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

        if !cli.quiet {
            print_summary(&output);
            eprintln!("   →  {}", bold(&output_path.display().to_string()));
        }
    } else {
        let json = if cli.report {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string_pretty(&output.record)
        }
        .context("Failed to serialise output")?;
        println!("{json}");

        if !cli.quiet && !show_progress {
            print_summary(&output);
        }
    }

    Ok(())
}

fn print_summary(output: &ExtractionOutput) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} fields  {} local / {} fallback  {} list entries  {}ms",
        if output.is_complete() {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.fields_resolved,
        stats.local_answers,
        stats.fallback_answers,
        stats.list_entries,
        stats.total_duration_ms,
    );
    for failure in &output.report.failed_sections {
        eprintln!("   {} {}", red("✗"), dim(&failure.error.to_string()));
    }
}

async fn load_schema(cli: &Cli) -> Result<Schema> {
    match cli.schema {
        Some(ref path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read schema from {:?}", path))?;
            Schema::from_json_str(&raw).context("Invalid schema file")
        }
        None => Ok(Schema::freight().clone()),
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(
    cli: &Cli,
    schema: Schema,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .schema(schema)
        .confidence_threshold(cli.threshold)
        .retry(RetryPolicy::new(cli.max_retries, cli.retry_delay_ms))
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .translate_concurrency(cli.translate_concurrency)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if cli.no_local {
        builder = builder.entity_extractor(Arc::new(NullExtractor));
    }
    #[cfg(feature = "onnx")]
    if let Some(ref dir) = cli.ner_model {
        let ner = edgequake_freight::GlinerExtractor::from_dir(dir)
            .with_context(|| format!("Failed to load NER model from {}", dir.display()))?;
        builder = builder.entity_extractor(Arc::new(ner));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
