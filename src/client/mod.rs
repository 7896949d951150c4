//! External collaborators the pipeline depends on.
//!
//! The pipeline never talks to a model directly. It calls two traits:
//!
//! * [`GenerativeClient`]: the large-language-model side: translation,
//!   section classification, single-answer QA and list QA.
//! * [`entity::EntityExtractor`]: the fast local side: scored candidate
//!   spans for a label. [`entity::KeyValueExtractor`] needs no model; with
//!   the `onnx` feature, `gliner::GlinerExtractor` runs a GLiNER span model.
//!
//! [`llm::LlmClient`] implements the generative side over any
//! `edgequake_llm::LLMProvider`; [`retry::RetryingClient`] wraps any client
//! so that every call goes through the same bounded retry policy. Tests
//! implement the traits with stubs.

pub mod entity;
#[cfg(feature = "onnx")]
pub mod gliner;
pub mod llm;
pub mod retry;

use crate::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use entity::{EntityCandidate, EntityExtractor, KeyValueExtractor, NullExtractor};
#[cfg(feature = "onnx")]
pub use gliner::GlinerExtractor;
pub use llm::LlmClient;
pub use retry::{with_retry, RetryPolicy, RetryingClient};

/// Reply of the translation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// Source language as reported by the model.
    pub lang: String,
    pub text: String,
}

/// A text answer with the model's own confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredText {
    pub text: String,
    pub score: f64,
}

impl ScoredText {
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// One structured answer of a list question, columns in schema order.
pub type ScoredTuple = Vec<(String, ScoredText)>;

/// The generative (LLM-backed) collaborator.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Detect the language of `text`, translate it and strip boilerplate.
    async fn translate(&self, text: &str) -> Result<Translation, ClientError>;

    /// Split `text` into the named sections. Returns at most one block per
    /// name, only for names in `sections`.
    async fn isolate_sections(
        &self,
        sections: &[String],
        text: &str,
    ) -> Result<Vec<(String, String)>, ClientError>;

    /// Answer one question against `text`.
    async fn answer_question(&self, question: &str, text: &str) -> Result<ScoredText, ClientError>;

    /// Answer an open-ended question with an ordered list of tuples.
    async fn find_multiple_answers(
        &self,
        question: &str,
        columns: &[String],
        text: &str,
    ) -> Result<Vec<ScoredTuple>, ClientError>;
}

#[async_trait]
impl<C: GenerativeClient + ?Sized> GenerativeClient for Arc<C> {
    async fn translate(&self, text: &str) -> Result<Translation, ClientError> {
        (**self).translate(text).await
    }

    async fn isolate_sections(
        &self,
        sections: &[String],
        text: &str,
    ) -> Result<Vec<(String, String)>, ClientError> {
        (**self).isolate_sections(sections, text).await
    }

    async fn answer_question(&self, question: &str, text: &str) -> Result<ScoredText, ClientError> {
        (**self).answer_question(question, text).await
    }

    async fn find_multiple_answers(
        &self,
        question: &str,
        columns: &[String],
        text: &str,
    ) -> Result<Vec<ScoredTuple>, ClientError> {
        (**self).find_multiple_answers(question, columns, text).await
    }
}
