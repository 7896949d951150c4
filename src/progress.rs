//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow
//! an extraction as it translates pages and resolves sections. The CLI uses
//! it to drive a progress bar; a service could forward the events to a job
//! record instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_freight::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ExtractionProgressCallback for Log {
//!     fn on_section_complete(&self, section: &str, fields: usize) {
//!         eprintln!("{section}: {fields} fields");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Log))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it moves through the stages.
///
/// All methods default to no-ops. With `translate_concurrency > 1`,
/// `on_page_translated` may be called from several tasks at once.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the page texts are available.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after each page is translated (1-indexed `page_num`).
    /// `language` is `None` for blank pages, which are not sent to the model.
    fn on_page_translated(&self, page_num: usize, total_pages: usize, language: Option<&str>) {
        let _ = (page_num, total_pages, language);
    }

    /// Called once every page has been split into sections.
    fn on_sections_aggregated(&self, found: usize, total: usize) {
        let _ = (found, total);
    }

    /// Called before the fields of a section are resolved.
    fn on_section_start(&self, section: &str) {
        let _ = section;
    }

    /// Called when a section resolved; `fields` counts leaves and list cells.
    fn on_section_complete(&self, section: &str, fields: usize) {
        let _ = (section, fields);
    }

    /// Called when a section failed and was filled with placeholders.
    fn on_section_error(&self, section: &str, error: &str) {
        let _ = (section, error);
    }

    /// Called once after every section has been attempted.
    fn on_extraction_complete(&self, total_sections: usize, failed_sections: usize) {
        let _ = (total_sections, failed_sections);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
