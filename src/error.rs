//! Error types for the edgequake-freight library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ExtractError`]: **Fatal**: the document cannot be processed at all
//!   (bad input file, provider not configured, a page that cannot be
//!   translated, a page that cannot be split into sections). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`SectionError`]: **Non-fatal**: one section could not be resolved
//!   (a question exhausted its retries, the model answered in the wrong
//!   shape). Stored in [`crate::output::ExtractionReport`]; the section is
//!   filled with zero-confidence placeholders and every other section is
//!   still resolved.
//!
//! * [`ClientError`]: what a single collaborator call can fail with. The
//!   pipeline stages lift it into one of the two types above depending on
//!   which stage made the call.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-freight library.
///
/// Section-level failures use [`SectionError`] and are stored in the
/// extraction report rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium returned an error while reading the text layer of a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// A local extraction model could not be loaded.
    #[error("Failed to load model '{path}': {detail}")]
    ModelLoadFailed { path: PathBuf, detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A page could not be translated; an untranslated page cannot be sectioned.
    #[error("Translation failed for page {page}: {source}")]
    TranslationFailed {
        page: usize,
        #[source]
        source: ClientError,
    },

    /// A page could not be split into schema sections.
    #[error("Section classification failed for page {page}: {source}")]
    AggregationFailed {
        page: usize,
        #[source]
        source: ClientError,
    },

    // ── Schema / config errors ────────────────────────────────────────────
    /// A custom schema document is not usable.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single section.
///
/// The section's leaves are emitted as zero-confidence placeholders and the
/// error is recorded in [`crate::output::SectionFailure`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionError {
    /// A collaborator call failed after the retry budget was spent.
    #[error("section '{section}': {operation} failed after {attempts} attempts: {detail}")]
    CallFailed {
        section: String,
        operation: String,
        attempts: u32,
        detail: String,
    },

    /// The collaborator answered, but not in the expected shape.
    #[error("section '{section}': malformed {operation} response: {detail}")]
    Malformed {
        section: String,
        operation: String,
        detail: String,
    },
}

impl SectionError {
    /// Scope a collaborator failure to the section that made the call.
    pub fn from_client(section: &str, err: ClientError) -> Self {
        match err {
            ClientError::Exhausted {
                operation,
                attempts,
                last,
            } => SectionError::CallFailed {
                section: section.to_string(),
                operation,
                attempts,
                detail: last,
            },
            ClientError::Malformed { operation, detail } => SectionError::Malformed {
                section: section.to_string(),
                operation,
                detail,
            },
            ClientError::Provider { operation, detail } => SectionError::CallFailed {
                section: section.to_string(),
                operation,
                attempts: 1,
                detail,
            },
        }
    }
}

/// Failure of one collaborator call (translation, classification, QA, NER).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// Transport or service error raised by the provider.
    #[error("{operation}: provider error: {detail}")]
    Provider { operation: String, detail: String },

    /// The provider answered but the body could not be interpreted.
    #[error("{operation}: malformed response: {detail}")]
    Malformed { operation: String, detail: String },

    /// Every attempt allowed by the retry policy failed.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

impl ClientError {
    pub fn provider(operation: &str, detail: impl std::fmt::Display) -> Self {
        ClientError::Provider {
            operation: operation.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn malformed(operation: &str, detail: impl std::fmt::Display) -> Self {
        ClientError::Malformed {
            operation: operation.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_failed_display_names_page() {
        let e = ExtractError::TranslationFailed {
            page: 3,
            source: ClientError::Exhausted {
                operation: "translate".into(),
                attempts: 3,
                last: "503".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
    }

    #[test]
    fn section_error_from_exhausted_keeps_attempts() {
        let err = ClientError::Exhausted {
            operation: "answer_question".into(),
            attempts: 3,
            last: "timeout".into(),
        };
        let s = SectionError::from_client("vessel_information", err);
        let msg = s.to_string();
        assert!(msg.contains("vessel_information"));
        assert!(msg.contains("after 3 attempts"));
    }

    #[test]
    fn section_error_from_malformed() {
        let err = ClientError::malformed("find_multiple_answers", "expected array");
        match SectionError::from_client("shipment_route", err) {
            SectionError::Malformed { section, detail, .. } => {
                assert_eq!(section, "shipment_route");
                assert_eq!(detail, "expected array");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn section_error_serialises_with_kind_tag() {
        let s = SectionError::Malformed {
            section: "a".into(),
            operation: "b".into(),
            detail: "c".into(),
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["kind"], "malformed");
    }

    #[test]
    fn invalid_schema_display() {
        let e = ExtractError::InvalidSchema("section 'x' has no fields".into());
        assert!(e.to_string().contains("no fields"));
    }
}
