//! Section aggregation: split each translated page into schema sections and
//! merge same-named sections across pages.
//!
//! The merge appends with a `\n` separator in page order, so for pages P1
//! and P2 both carrying `cargo_information` the result is always
//! `T1 + "\n" + T2`. Blank pages are not sent to the classifier.

use crate::client::GenerativeClient;
use crate::error::ExtractError;
use crate::pipeline::normalize::normalize;
use crate::pipeline::translate::TranslatedPage;
use tracing::{debug, info, warn};

/// Accumulated text per section, in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionMap {
    entries: Vec<(String, String)>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text of `name`, or `""` when no page classified into it.
    pub fn text_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Append `text` to `name`, newline-separated after existing content.
    pub fn append(&mut self, name: &str, text: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => {
                existing.push('\n');
                existing.push_str(text);
            }
            None => self.entries.push((name.to_string(), text.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Section names in first-appearance order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The whole document as seen by the fallback: every section's text
    /// joined with `\n`, in first-appearance order.
    pub fn document_text(&self) -> String {
        self.entries
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Classify every page into `section_names` and merge the results.
///
/// Names the classifier invents are dropped, as is a second block for the
/// same name within one page's reply. A classification that fails after
/// retries aborts the document.
pub async fn aggregate(
    client: &dyn GenerativeClient,
    pages: &[TranslatedPage],
    section_names: &[String],
) -> Result<SectionMap, ExtractError> {
    let mut map = SectionMap::new();

    for page in pages {
        if page.is_blank() {
            debug!("Page {} is blank, nothing to classify", page.page_num);
            continue;
        }

        let blocks = client
            .isolate_sections(section_names, &page.text)
            .await
            .map_err(|source| ExtractError::AggregationFailed {
                page: page.page_num,
                source,
            })?;

        let mut seen: Vec<&str> = Vec::new();
        for (name, text) in &blocks {
            if !section_names.iter().any(|s| s == name) {
                warn!("Page {}: ignoring unknown section '{}'", page.page_num, name);
                continue;
            }
            if seen.contains(&name.as_str()) {
                warn!("Page {}: duplicate block for '{}' ignored", page.page_num, name);
                continue;
            }
            seen.push(name);

            let text = normalize(text);
            if text.trim().is_empty() {
                continue;
            }
            map.append(name, &text);
        }

        debug!("Page {}: sections {:?}", page.page_num, seen);
    }

    info!(
        "Aggregated {} of {} sections",
        map.len(),
        section_names.len()
    );
    Ok(map)
}
