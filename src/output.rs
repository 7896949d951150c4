//! Output types: the schema-shaped record, the run report and statistics.
//!
//! [`ExtractionResult`] serialises to exactly the shape of the schema: every
//! field becomes `{"value": ..., "confidence": ...}`, every group becomes an
//! object and every list becomes an array of per-column scored tuples. Key
//! order follows the schema so two runs over the same document produce
//! byte-identical JSON.
//!
//! Diagnostics live beside the record, not inside it, in
//! [`ExtractionReport`] and [`ExtractionStats`].

use crate::error::SectionError;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

/// The atomic answer for one leaf field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAnswer {
    pub value: String,
    /// Always in `[0, 1]`.
    pub confidence: f64,
}

impl FieldAnswer {
    /// Build an answer, clamping the score into `[0, 1]`. NaN becomes 0.
    pub fn new(value: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            value: value.into(),
            confidence,
        }
    }

    /// Zero-confidence empty answer used for fields of a failed section.
    pub fn placeholder() -> Self {
        Self {
            value: String::new(),
            confidence: 0.0,
        }
    }
}

/// One entry of a list field, e.g. `{port_name, eta}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListEntry(pub Vec<(String, FieldAnswer)>);

impl ListEntry {
    pub fn get(&self, column: &str) -> Option<&FieldAnswer> {
        self.0.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }
}

/// A resolved node of the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedNode {
    Field(FieldAnswer),
    Group(Vec<(String, ExtractedNode)>),
    List(Vec<ListEntry>),
}

impl ExtractedNode {
    /// Child of a group by name.
    pub fn get(&self, name: &str) -> Option<&ExtractedNode> {
        match self {
            ExtractedNode::Group(children) => {
                children.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldAnswer> {
        match self {
            ExtractedNode::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ListEntry]> {
        match self {
            ExtractedNode::List(items) => Some(items),
            _ => None,
        }
    }

    /// Every leaf answer under this node, in schema order.
    pub fn leaves(&self) -> Vec<&FieldAnswer> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }
}

fn collect_leaves<'a>(node: &'a ExtractedNode, out: &mut Vec<&'a FieldAnswer>) {
    match node {
        ExtractedNode::Field(f) => out.push(f),
        ExtractedNode::Group(children) => {
            for (_, child) in children {
                collect_leaves(child, out);
            }
        }
        ExtractedNode::List(items) => {
            for item in items {
                out.extend(item.0.iter().map(|(_, v)| v));
            }
        }
    }
}

impl Serialize for ListEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for ExtractedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractedNode::Field(f) => f.serialize(serializer),
            ExtractedNode::Group(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (k, v) in children {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            ExtractedNode::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// The final nested record, one entry per schema section in schema order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractionResult {
    pub sections: Vec<(String, ExtractedNode)>,
}

impl ExtractionResult {
    pub fn section(&self, name: &str) -> Option<&ExtractedNode> {
        self.sections.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Look up a leaf by path, e.g. `["parties_information", "shipper", "name"]`.
    pub fn field(&self, path: &[&str]) -> Option<&FieldAnswer> {
        let (first, rest) = path.split_first()?;
        let mut node = self.section(first)?;
        for name in rest {
            node = node.get(name)?;
        }
        node.as_field()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (k, v) in &self.sections {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Whether every section resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Complete,
    /// At least one section failed and carries placeholders.
    Partial,
}

/// Per-page diagnostics from the translation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed.
    pub page_num: usize,
    /// Language reported by the translator; `None` for blank pages.
    pub language: Option<String>,
    pub input_chars: usize,
    pub translated_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionFailure {
    pub section: String,
    pub error: SectionError,
}

/// What happened during one extraction, beside the record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub status: ExtractionStatus,
    pub pages: Vec<PageReport>,
    /// Sections the classifier found on at least one page, in first-seen order.
    pub sections_found: Vec<String>,
    /// Schema sections no page classified into; resolved against empty text.
    pub missing_sections: Vec<String>,
    pub failed_sections: Vec<SectionFailure>,
}

/// Aggregate counters and timings for one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub blank_pages: usize,
    pub sections_resolved: usize,
    pub fields_resolved: usize,
    /// Fields answered by the local extractor. Normally above the threshold;
    /// a lower local answer is kept only when the fallback had none.
    pub local_answers: usize,
    /// Fields escalated to the generative fallback.
    pub fallback_answers: usize,
    pub list_entries: usize,
    pub translate_duration_ms: u64,
    pub aggregate_duration_ms: u64,
    pub resolve_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything an extraction returns.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub record: ExtractionResult,
    pub report: ExtractionReport,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    pub fn is_complete(&self) -> bool {
        self.report.status == ExtractionStatus::Complete
    }
}
