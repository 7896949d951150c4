//! # edgequake-freight
//!
//! Extract structured shipment data (booking, route, cargo, vessel, parties)
//! from freight-forwarding PDFs into a schema-shaped JSON record with a
//! confidence score on every field.
//!
//! ## Why this crate?
//!
//! Booking confirmations and bills of lading arrive in many languages and
//! layouts, with the same label (`name`, `contact_details`) meaning different
//! things for the shipper and the carrier. This crate normalizes each page
//! through an LLM, splits the document into named sections, and then asks
//! one question per field. A cheap local extractor answers what it can; the
//! LLM is consulted only when the local answer scores below the threshold.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Text       read each page's text layer via pdfium (spawn_blocking)
//!  ├─ 3. Translate  per page: detect language, translate, drop T&Cs
//!  ├─ 4. Aggregate  split pages into schema sections, merge in page order
//!  ├─ 5. Resolve    per field: local extractor, gated LLM fallback; lists via LLM
//!  └─ 6. Output     schema-shaped record + report + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_freight::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / GROQ_API_KEY / OPENAI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract("booking.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     eprintln!("{} local / {} fallback answers",
//!         output.stats.local_answers,
//!         output.stats.fallback_answers);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `freight2json` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `onnx`  | off     | `GlinerExtractor`, a local GLiNER span model on ONNX Runtime (ort + tokenizers + ndarray) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-freight = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod answer;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use answer::{AnswerContext, AnswerOrigin, AnswerSource, FallbackSource, GatedSource, LocalSource, Sourced};
pub use client::{
    EntityCandidate, EntityExtractor, GenerativeClient, KeyValueExtractor, LlmClient, NullExtractor,
    RetryingClient, ScoredText, ScoredTuple, Translation,
};
#[cfg(feature = "onnx")]
pub use client::GlinerExtractor;
pub use config::{ExtractionConfig, ExtractionConfigBuilder, RetryPolicy};
pub use error::{ClientError, ExtractError, SectionError};
pub use extract::{extract, extract_from_bytes, extract_sync, extract_to_file, Extractor};
pub use output::{
    ExtractedNode, ExtractionOutput, ExtractionReport, ExtractionResult, ExtractionStats,
    ExtractionStatus, FieldAnswer, ListEntry, PageReport, SectionFailure,
};
pub use pipeline::aggregate::SectionMap;
pub use pipeline::normalize::normalize;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback};
pub use schema::{ListSpec, NodeKind, Schema, SchemaNode, SectionSpec};
