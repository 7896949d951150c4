//! Answer sources and the confidence gate.
//!
//! Every single-answer field goes through one [`AnswerSource`]. The default
//! composition is
//!
//! ```text
//! GatedSource { primary: LocalSource, fallback: FallbackSource, threshold: 0.9 }
//! ```
//!
//! The local extractor only sees the section text. The fallback sees the
//! whole document, since conservative section classification can leave an
//! answer outside the section it belongs to.

use crate::client::entity::{EntityExtractor, ANSWER_LABEL};
use crate::client::GenerativeClient;
use crate::error::ClientError;
use crate::output::FieldAnswer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The texts a question is answered against.
#[derive(Debug, Clone, Copy)]
pub struct AnswerContext<'a> {
    /// Normalized text of the section the field belongs to; may be empty.
    pub section_text: &'a str,
    /// Normalized text of the whole aggregated document.
    pub document_text: &'a str,
}

/// Which source produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOrigin {
    Local,
    Fallback,
}

/// An answer together with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced {
    pub answer: FieldAnswer,
    pub origin: AnswerOrigin,
}

/// Strategy for answering one question.
///
/// `Ok(None)` means "no answer", which is distinct from a failed call.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        ctx: &AnswerContext<'_>,
    ) -> Result<Option<Sourced>, ClientError>;
}

#[async_trait]
impl<S: AnswerSource + ?Sized> AnswerSource for Arc<S> {
    async fn answer(
        &self,
        question: &str,
        ctx: &AnswerContext<'_>,
    ) -> Result<Option<Sourced>, ClientError> {
        (**self).answer(question, ctx).await
    }
}

/// Local entity extraction over `question + "\n" + section_text`.
pub struct LocalSource {
    extractor: Arc<dyn EntityExtractor>,
}

impl LocalSource {
    pub fn new(extractor: Arc<dyn EntityExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl AnswerSource for LocalSource {
    async fn answer(
        &self,
        question: &str,
        ctx: &AnswerContext<'_>,
    ) -> Result<Option<Sourced>, ClientError> {
        let input = format!("{}\n{}", question, ctx.section_text);
        let candidates = self.extractor.extract(&input, &[ANSWER_LABEL]).await?;

        let best = candidates
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));

        Ok(best.map(|c| Sourced {
            answer: FieldAnswer::new(c.text, c.score),
            origin: AnswerOrigin::Local,
        }))
    }
}

/// Generative question answering over the whole document.
pub struct FallbackSource {
    client: Arc<dyn GenerativeClient>,
}

impl FallbackSource {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnswerSource for FallbackSource {
    async fn answer(
        &self,
        question: &str,
        ctx: &AnswerContext<'_>,
    ) -> Result<Option<Sourced>, ClientError> {
        let reply = self.client.answer_question(question, ctx.document_text).await?;
        Ok(Some(Sourced {
            answer: FieldAnswer::new(reply.text, reply.score),
            origin: AnswerOrigin::Fallback,
        }))
    }
}

/// Accepts the primary answer when it clears `threshold`, else asks the
/// fallback exactly once.
///
/// A failed primary call escalates like a missing answer: the local
/// extractor is an optimisation and never the only way to an answer. A
/// failed fallback call is returned as an error.
pub struct GatedSource<P, F> {
    primary: P,
    fallback: F,
    threshold: f64,
}

impl<P: AnswerSource, F: AnswerSource> GatedSource<P, F> {
    pub fn new(primary: P, fallback: F, threshold: f64) -> Self {
        Self {
            primary,
            fallback,
            threshold,
        }
    }
}

#[async_trait]
impl<P: AnswerSource, F: AnswerSource> AnswerSource for GatedSource<P, F> {
    async fn answer(
        &self,
        question: &str,
        ctx: &AnswerContext<'_>,
    ) -> Result<Option<Sourced>, ClientError> {
        let primary = match self.primary.answer(question, ctx).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Local extraction failed for {:?}, escalating: {}", question, e);
                None
            }
        };

        match primary {
            Some(p) if p.answer.confidence >= self.threshold => {
                debug!(
                    "Accepted local answer for {:?} ({:.2})",
                    question, p.answer.confidence
                );
                Ok(Some(p))
            }
            low => {
                debug!(
                    "Escalating {:?} to fallback (local: {:?})",
                    question,
                    low.as_ref().map(|p| p.answer.confidence)
                );
                Ok(self.fallback.answer(question, ctx).await?.or(low))
            }
        }
    }
}
