//! Local entity extraction.
//!
//! An [`EntityExtractor`] receives a text (the question followed by the
//! section text) and a set of labels, and returns scored candidate spans.
//! The resolver always asks for the single label [`ANSWER_LABEL`] and keeps
//! the best-scoring span.
//!
//! Two extractors ship with the crate:
//!
//! * [`KeyValueExtractor`]: reads the field name out of the question and
//!   looks for `Key: value` pairs whose key names that field. Shipping
//!   documents are mostly labelled pairs, so this answers the easy fields
//!   without a model call. A bare key such as `Name:` only counts as the
//!   shipper's name under a `Shipper` heading line; elsewhere it scores
//!   below the default gate. With the `onnx` feature, a GLiNER model can
//!   replace it (`client::gliner`).
//! * [`NullExtractor`]: never answers; every field goes to the fallback.

use crate::error::ClientError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// The single generic label the resolver requests.
pub const ANSWER_LABEL: &str = "answer";

/// One scored span returned by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub text: String,
    pub score: f64,
    pub label: String,
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Zero or more candidates for `labels` found in `text`.
    async fn extract(&self, text: &str, labels: &[&str]) -> Result<Vec<EntityCandidate>, ClientError>;
}

#[async_trait]
impl<E: EntityExtractor + ?Sized> EntityExtractor for Arc<E> {
    async fn extract(&self, text: &str, labels: &[&str]) -> Result<Vec<EntityCandidate>, ClientError> {
        (**self).extract(text, labels).await
    }
}

/// Extractor that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExtractor;

#[async_trait]
impl EntityExtractor for NullExtractor {
    async fn extract(&self, _text: &str, _labels: &[&str]) -> Result<Vec<EntityCandidate>, ClientError> {
        Ok(Vec::new())
    }
}

/// Label/value pair matcher for questions of the form
/// "What is the `<field>` [of the `<group>` [of the `<section>`]]?".
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueExtractor;

static RE_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*what is the (.+?)\?\s*$").unwrap());

static RE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 ./#&()_-]{0,48}?)\s*[:：]\s*(.*?)\s*$").unwrap()
});

static RE_SEGMENT_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\t]|\s{3,}").unwrap());

/// Multiplier for a key that names none of the group qualifiers, neither
/// itself nor through the heading it sits under. Keeps a bare `Name:` from
/// clearing the default gate for "the name of the shipper".
const UNQUALIFIED_KEY_FACTOR: f64 = 0.5;

#[async_trait]
impl EntityExtractor for KeyValueExtractor {
    async fn extract(&self, text: &str, labels: &[&str]) -> Result<Vec<EntityCandidate>, ClientError> {
        let Some(label) = labels.first() else {
            return Ok(Vec::new());
        };

        let mut lines = text.lines();
        let Some(question) = lines.next() else {
            return Ok(Vec::new());
        };
        let Some(question) = Question::parse(question) else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        let mut heading: Vec<String> = Vec::new();
        for line in lines {
            let pairs = pairs_in_line(line);
            if pairs.iter().all(|(_, value)| value.is_empty()) {
                // "Shipper", "Carrier:" and the like open a new block.
                if !line.trim().is_empty() {
                    heading = words(line);
                }
                continue;
            }
            for (key, value) in pairs {
                if value.is_empty() {
                    continue;
                }
                let score = question.score(&words(&key), &heading);
                if score > 0.0 {
                    candidates.push(EntityCandidate {
                        text: value,
                        score,
                        label: label.to_string(),
                    });
                }
            }
        }
        Ok(candidates)
    }
}

/// A templated question split into its parts.
struct Question {
    /// Words of the field name.
    target: Vec<String>,
    /// Words of every qualifier, section included.
    context: HashSet<String>,
    /// Words of the group qualifiers (every qualifier but the section).
    group: HashSet<String>,
}

impl Question {
    fn parse(question: &str) -> Option<Self> {
        let caps = RE_QUESTION.captures(question)?;
        let mut parts = caps[1].split(" of the ");
        let target = words(parts.next()?);
        if target.is_empty() {
            return None;
        }
        let qualifiers: Vec<&str> = parts.collect();
        let group = match qualifiers.split_last() {
            Some((_, groups)) => groups.iter().flat_map(|q| words(q)).collect(),
            None => HashSet::new(),
        };
        let context = qualifiers.iter().flat_map(|q| words(q)).collect();
        Some(Self {
            target,
            context,
            group,
        })
    }

    /// Share of field words the key names, times the share of key words
    /// explained by the field or its qualifiers. A key that names no group
    /// qualifier, alone or with its heading, is scaled down.
    fn score(&self, key: &[String], heading: &[String]) -> f64 {
        if key.is_empty() {
            return 0.0;
        }
        let key_set: HashSet<&str> = key.iter().map(String::as_str).collect();
        let matched = self
            .target
            .iter()
            .filter(|w| key_set.contains(w.as_str()))
            .count();
        if matched == 0 {
            return 0.0;
        }
        let explained = key_set
            .iter()
            .filter(|w| self.target.iter().any(|t| t == *w) || self.context.contains(**w))
            .count();
        let score = (matched as f64 / self.target.len() as f64)
            * (explained as f64 / key_set.len() as f64);

        let qualified = self.group.is_empty()
            || key_set.iter().any(|w| self.group.contains(*w))
            || heading.iter().any(|w| self.group.contains(w));
        if qualified {
            score
        } else {
            score * UNQUALIFIED_KEY_FACTOR
        }
    }
}

/// Lower-cased words with common shipping abbreviations expanded.
fn words(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '#')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let w = w.to_lowercase();
            match w.as_str() {
                "no" | "nr" | "num" | "#" => "number".to_string(),
                "ref" => "reference".to_string(),
                "qty" => "quantity".to_string(),
                "wt" => "weight".to_string(),
                "desc" => "description".to_string(),
                "vsl" => "vessel".to_string(),
                "voy" => "voyage".to_string(),
                "pol" => "origin".to_string(),
                "pod" => "destination".to_string(),
                _ => w,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn best(question: &str, text: &str) -> Option<EntityCandidate> {
        let input = format!("{question}\n{text}");
        KeyValueExtractor
            .extract(&input, &[ANSWER_LABEL])
            .await
            .unwrap()
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    #[tokio::test]
    async fn finds_inline_pair_with_abbreviated_key() {
        let c = best(
            "What is the booking_number?",
            "Booking No: ABC123, Contract: XY-99",
        )
        .await
        .unwrap();
        assert_eq!(c.text, "ABC123");
        assert_eq!(c.score, 1.0);
        assert_eq!(c.label, "answer");
    }

    #[tokio::test]
    async fn partial_key_scores_below_exact() {
        let c = best(
            "What is the service_contract_number?",
            "Booking No: ABC123, Contract: XY-99",
        )
        .await
        .unwrap();
        assert_eq!(c.text, "XY-99");
        assert!(c.score < 0.9, "score {}", c.score);
    }

    #[tokio::test]
    async fn qualifiers_disambiguate_shared_field_names() {
        let text = "Shipper Name: ACME Steel\nCarrier Name: Blue Line";
        let c = best("What is the name of the carrier of the parties_information?", text)
            .await
            .unwrap();
        assert_eq!(c.text, "Blue Line");
        assert_eq!(c.score, 1.0);
    }

    #[tokio::test]
    async fn headings_scope_bare_keys_to_their_party() {
        let text = "Shipper\nName: ACME Steel\nCarrier\nName: Blue Line";
        let c = best("What is the name of the shipper of the parties_information?", text)
            .await
            .unwrap();
        assert_eq!(c.text, "ACME Steel");
        assert_eq!(c.score, 1.0);

        let c = best("What is the name of the carrier of the parties_information?", text)
            .await
            .unwrap();
        assert_eq!(c.text, "Blue Line");
    }

    #[tokio::test]
    async fn bare_key_without_party_heading_stays_below_gate() {
        let text = "Name: ACME Steel\nName: Blue Line";
        let all = KeyValueExtractor
            .extract(
                &format!("What is the name of the shipper of the parties_information?\n{text}"),
                &[ANSWER_LABEL],
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.score < 0.9), "{all:?}");
    }

    #[tokio::test]
    async fn section_qualifier_alone_does_not_penalise() {
        let c = best(
            "What is the vessel_name of the vessel_information?",
            "Vessel Name: MSC ANNA",
        )
        .await
        .unwrap();
        assert_eq!(c.score, 1.0);
    }

    #[tokio::test]
    async fn keyless_segments_continue_previous_value() {
        let c = best(
            "What is the contact_details of the shipper of the parties_information?",
            "Contact Details: Jane Roe, +82 2 1234",
        )
        .await
        .unwrap();
        assert_eq!(c.text, "Jane Roe, +82 2 1234");
    }

    #[tokio::test]
    async fn unknown_question_shape_or_no_labels_yields_nothing() {
        let out = KeyValueExtractor
            .extract("Tell me everything\nBooking No: 1", &[ANSWER_LABEL])
            .await
            .unwrap();
        assert!(out.is_empty());
        let out = KeyValueExtractor
            .extract("What is the booking_number?\nBooking No: 1", &[])
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn null_extractor_never_answers() {
        let out = NullExtractor
            .extract("What is the vessel_name?\nVessel: X", &[ANSWER_LABEL])
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn words_expand_abbreviations() {
        assert_eq!(words("Vsl / Voy No."), vec!["vessel", "voyage", "number"]);
        assert_eq!(words("booking_number"), vec!["booking", "number"]);
    }
}
