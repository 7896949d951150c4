//! Translation stage: one generative call per page.
//!
//! Each page is normalized, then handed to [`GenerativeClient::translate`],
//! which detects the language, translates into the target language and
//! drops legal boilerplate. Pages are independent, so up to `concurrency`
//! pages are in flight at once; `buffered` yields results in page order
//! regardless of completion order.
//!
//! A page that still fails after the retry budget aborts the document: an
//! untranslated page cannot be split into sections.

use crate::client::GenerativeClient;
use crate::error::ExtractError;
use crate::pipeline::normalize::normalize;
use crate::progress::ExtractionProgressCallback;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// A page after language normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedPage {
    /// 1-indexed.
    pub page_num: usize,
    /// Detected source language; `None` when the page was blank.
    pub language: Option<String>,
    pub text: String,
    /// Characters of extracted text before translation.
    pub input_chars: usize,
}

impl TranslatedPage {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Translate one page. Blank pages are returned as-is without a call.
pub async fn translate_page(
    client: &dyn GenerativeClient,
    page_num: usize,
    raw: &str,
) -> Result<TranslatedPage, ExtractError> {
    let text = normalize(raw);
    let input_chars = text.chars().count();

    if text.trim().is_empty() {
        debug!("Page {} is blank, skipping translation", page_num);
        return Ok(TranslatedPage {
            page_num,
            language: None,
            text: String::new(),
            input_chars,
        });
    }

    let translation = client
        .translate(&text)
        .await
        .map_err(|source| ExtractError::TranslationFailed {
            page: page_num,
            source,
        })?;

    debug!(
        "Page {}: {} → {} chars (source language {})",
        page_num,
        input_chars,
        translation.text.chars().count(),
        translation.lang
    );

    Ok(TranslatedPage {
        page_num,
        language: Some(translation.lang),
        text: normalize(&translation.text),
        input_chars,
    })
}

/// Translate every page, at most `concurrency` at a time, in page order.
pub async fn translate_pages(
    client: &dyn GenerativeClient,
    pages: &[String],
    concurrency: usize,
    progress: Option<&dyn ExtractionProgressCallback>,
) -> Result<Vec<TranslatedPage>, ExtractError> {
    let total = pages.len();
    info!(
        "Translating {} pages (concurrency {})",
        total,
        concurrency.max(1)
    );

    stream::iter(0..pages.len())
        .map(|idx| async move {
            let page = translate_page(client, idx + 1, &pages[idx]).await?;
            if let Some(cb) = progress {
                cb.on_page_translated(page.page_num, total, page.language.as_deref());
            }
            Ok::<_, ExtractError>(page)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}
