//! GLiNER span extraction on ONNX Runtime.
//!
//! Loads a span-mode GLiNER export: a directory holding `model.onnx` and
//! `tokenizer.json`. The model is asked for the labels the resolver passes
//! (in practice the single label `"answer"`) over the question followed by
//! the section text, and every span scoring at least [`MIN_SCORE`] becomes
//! a candidate. Spans inside the question itself are never returned.
//!
//! Long sections are cut into windows of [`WINDOW_WORDS`] words; the
//! question is repeated in front of every window.
//!
//! ```rust,ignore
//! use edgequake_freight::{ExtractionConfig, GlinerExtractor};
//! use std::sync::Arc;
//!
//! let ner = GlinerExtractor::from_dir("models/gliner_small")?;
//! let config = ExtractionConfig::builder()
//!     .entity_extractor(Arc::new(ner))
//!     .build()?;
//! ```

use super::entity::{EntityCandidate, EntityExtractor};
use crate::error::{ClientError, ExtractError};
use async_trait::async_trait;
use ndarray::{Array2, Array3};
use once_cell::sync::Lazy;
use ort::{session::Session, value::Value};
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info};

const OP: &str = "extract";

/// Longest span the export scores, in words.
const MAX_WIDTH: usize = 12;

/// Section words per inference window.
pub const WINDOW_WORDS: usize = 256;

/// Spans below this probability are dropped.
pub const MIN_SCORE: f32 = 0.3;

const ENT_TOKEN: &str = "<<ENT>>";
const SEP_TOKEN: &str = "<<SEP>>";

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+(?:[-_]\w+)*|\S").unwrap());

/// Local extractor backed by a GLiNER ONNX model.
#[derive(Clone)]
pub struct GlinerExtractor {
    inner: Arc<Inner>,
}

struct Inner {
    /// `Session::run` needs `&mut self`.
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for GlinerExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlinerExtractor").finish_non_exhaustive()
    }
}

impl GlinerExtractor {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn from_dir(model_dir: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let model_dir = model_dir.as_ref();
        Self::from_files(&model_dir.join("model.onnx"), &model_dir.join("tokenizer.json"))
    }

    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, ExtractError> {
        for path in [model_path, tokenizer_path] {
            if !path.exists() {
                return Err(ExtractError::ModelLoadFailed {
                    path: path.to_path_buf(),
                    detail: "file not found".into(),
                });
            }
        }

        info!("Loading GLiNER model from {}", model_path.display());
        let load_err = |detail: String| ExtractError::ModelLoadFailed {
            path: model_path.to_path_buf(),
            detail,
        };
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| load_err(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| ExtractError::ModelLoadFailed {
            path: tokenizer_path.to_path_buf(),
            detail: e.to_string(),
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                tokenizer,
            }),
        })
    }
}

#[async_trait]
impl EntityExtractor for GlinerExtractor {
    async fn extract(&self, text: &str, labels: &[&str]) -> Result<Vec<EntityCandidate>, ClientError> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();

        tokio::task::spawn_blocking(move || inner.extract(&text, &labels))
            .await
            .map_err(|e| ClientError::provider(OP, format!("inference task panicked: {e}")))?
    }
}

impl Inner {
    fn extract(&self, text: &str, labels: &[String]) -> Result<Vec<EntityCandidate>, ClientError> {
        let (question, body) = text.split_once('\n').unwrap_or(("", text));
        let question_words: Vec<&str> = split_words(question)
            .into_iter()
            .map(|(s, e)| &question[s..e])
            .collect();
        let body_words = split_words(body);
        let offset = question_words.len();

        let mut out = Vec::new();
        for window in body_words.chunks(WINDOW_WORDS) {
            let words: Vec<&str> = question_words
                .iter()
                .copied()
                .chain(window.iter().map(|&(s, e)| &body[s..e]))
                .collect();

            for span in self.score_spans(&words, labels, offset)? {
                let Some(label) = labels.get(span.class) else {
                    continue;
                };
                let (start, _) = window[span.start - offset];
                let (_, end) = window[span.end - offset];
                out.push(EntityCandidate {
                    text: body[start..end].to_string(),
                    score: f64::from(span.score),
                    label: label.clone(),
                });
            }
        }
        debug!("GLiNER: {} candidate(s) over {} word(s)", out.len(), body_words.len());
        Ok(out)
    }

    fn score_spans(
        &self,
        words: &[&str],
        labels: &[String],
        first_word: usize,
    ) -> Result<Vec<Span>, ClientError> {
        let err = |e: &dyn std::fmt::Display| ClientError::provider(OP, e.to_string());

        let prompt = prompt_tokens(labels);
        let tokens: Vec<&str> = prompt.iter().copied().chain(words.iter().copied()).collect();
        let encoding = self
            .tokenizer
            .encode(tokens.as_slice(), true)
            .map_err(|e| err(&format!("tokenization failed: {e}")))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let seq_len = ids.len();
        let mask = words_mask(encoding.get_word_ids(), prompt.len());
        let num_words = words.len();
        let (span_idx, span_mask) = span_index(num_words);
        let num_spans = span_mask.len();

        let input_ids = Array2::from_shape_vec((1, seq_len), ids).map_err(|e| err(&e))?;
        let attention_mask = Array2::<i64>::ones((1, seq_len));
        let words_mask = Array2::from_shape_vec((1, seq_len), mask).map_err(|e| err(&e))?;
        let text_lengths = Array2::from_elem((1, 1), num_words as i64);
        let span_idx = Array3::from_shape_vec((1, num_spans, 2), span_idx).map_err(|e| err(&e))?;
        let span_mask = Array2::from_shape_vec((1, num_spans), span_mask).map_err(|e| err(&e))?;

        let input_ids = Value::from_array(input_ids).map_err(|e| err(&e))?;
        let attention_mask = Value::from_array(attention_mask).map_err(|e| err(&e))?;
        let words_mask = Value::from_array(words_mask).map_err(|e| err(&e))?;
        let text_lengths = Value::from_array(text_lengths).map_err(|e| err(&e))?;
        let span_idx = Value::from_array(span_idx).map_err(|e| err(&e))?;
        let span_mask = Value::from_array(span_mask).map_err(|e| err(&e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| err(&format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "words_mask" => words_mask,
                "text_lengths" => text_lengths,
                "span_idx" => span_idx,
                "span_mask" => span_mask,
            ])
            .map_err(|e| err(&format!("inference failed: {e}")))?;

        // [1, num_words, MAX_WIDTH, num_labels]
        let (shape, logits) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| err(&e))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 4 || dims[1] != num_words || dims[2] != MAX_WIDTH {
            return Err(ClientError::malformed(
                OP,
                format!("unexpected logits shape {dims:?}"),
            ));
        }

        Ok(decode(logits, num_words, dims[3], first_word))
    }
}

/// A scored word span, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: usize,
    end: usize,
    class: usize,
    score: f32,
}

/// Byte ranges of the words GLiNER sees.
fn split_words(text: &str) -> Vec<(usize, usize)> {
    RE_WORD.find_iter(text).map(|m| (m.start(), m.end())).collect()
}

/// `<<ENT>> label ... <<SEP>>`
fn prompt_tokens(labels: &[String]) -> Vec<&str> {
    let mut out = Vec::with_capacity(labels.len() * 2 + 1);
    for label in labels {
        out.push(ENT_TOKEN);
        out.push(label.as_str());
    }
    out.push(SEP_TOKEN);
    out
}

/// 1-based text word index on the first sub-token of each text word, 0
/// everywhere else (special tokens, prompt, continuation sub-tokens).
fn words_mask(word_ids: &[Option<u32>], prompt_len: usize) -> Vec<i64> {
    let mut prev = None;
    word_ids
        .iter()
        .map(|&id| {
            let first = id.is_some() && id != prev;
            prev = id;
            match id {
                Some(w) if first && w as usize >= prompt_len => (w as usize - prompt_len + 1) as i64,
                _ => 0,
            }
        })
        .collect()
}

/// Every `(start, start + width)` pair, flattened, with a mask for spans
/// that run past the last word.
fn span_index(num_words: usize) -> (Vec<i64>, Vec<bool>) {
    let mut idx = Vec::with_capacity(num_words * MAX_WIDTH * 2);
    let mut mask = Vec::with_capacity(num_words * MAX_WIDTH);
    for start in 0..num_words {
        for width in 0..MAX_WIDTH {
            let end = start + width;
            idx.push(start as i64);
            idx.push(end as i64);
            mask.push(end < num_words);
        }
    }
    (idx, mask)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Spans starting at or after `first_word` that clear [`MIN_SCORE`], best
/// first, with overlapping lower-scored spans removed.
fn decode(logits: &[f32], num_words: usize, num_classes: usize, first_word: usize) -> Vec<Span> {
    let mut spans = Vec::new();
    for start in first_word..num_words {
        for width in 0..MAX_WIDTH {
            let end = start + width;
            if end >= num_words {
                break;
            }
            for class in 0..num_classes {
                let Some(&logit) = logits.get((start * MAX_WIDTH + width) * num_classes + class) else {
                    continue;
                };
                let score = sigmoid(logit);
                if score >= MIN_SCORE {
                    spans.push(Span {
                        start,
                        end,
                        class,
                        score,
                    });
                }
            }
        }
    }

    spans.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Span> = Vec::new();
    for span in spans {
        if kept.iter().all(|k| span.end < k.start || span.start > k.end) {
            kept.push(span);
        }
    }
    kept
}
