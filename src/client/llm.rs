//! Generative collaborator over an `edgequake_llm` provider.
//!
//! Each [`GenerativeClient`] method is one chat completion: a system message
//! from [`crate::prompts`] and a user message carrying the text. The model is
//! asked for JSON; the reply is unfenced, parsed and reshaped here. A reply
//! that cannot be reshaped is a [`ClientError::Malformed`], which the
//! retry middleware treats like any other failure.
//!
//! Parsing is split into free functions so it is testable without a
//! provider.

use super::{GenerativeClient, ScoredText, ScoredTuple, Translation};
use crate::config::ExtractionConfig;
use crate::error::ClientError;
use crate::pipeline::normalize::strip_json_fence;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// [`GenerativeClient`] backed by a chat-completion provider.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    target_language: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("target_language", &self.target_language)
            .finish()
    }
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            target_language: config.target_language.clone(),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// One completion, parsed as JSON.
    async fn complete_json(
        &self,
        operation: &str,
        system: String,
        user: String,
    ) -> Result<Value, ClientError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| ClientError::provider(operation, e))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            operation,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_json_reply(operation, &response.content)
    }
}

#[async_trait]
impl GenerativeClient for LlmClient {
    async fn translate(&self, text: &str) -> Result<Translation, ClientError> {
        let reply = self
            .complete_json(
                "translate",
                prompts::translate_system_prompt(&self.target_language),
                prompts::translate_user_prompt(text),
            )
            .await?;
        parse_translation(&reply)
    }

    async fn isolate_sections(
        &self,
        sections: &[String],
        text: &str,
    ) -> Result<Vec<(String, String)>, ClientError> {
        let reply = self
            .complete_json(
                "isolate_sections",
                prompts::sections_system_prompt(sections),
                prompts::sections_user_prompt(text),
            )
            .await?;
        parse_sections(&reply, sections)
    }

    async fn answer_question(&self, question: &str, text: &str) -> Result<ScoredText, ClientError> {
        let reply = self
            .complete_json(
                "answer_question",
                prompts::ANSWER_SYSTEM_PROMPT.to_string(),
                prompts::question_user_prompt(question, text),
            )
            .await?;
        parse_scored("answer_question", &reply)
    }

    async fn find_multiple_answers(
        &self,
        question: &str,
        columns: &[String],
        text: &str,
    ) -> Result<Vec<ScoredTuple>, ClientError> {
        let reply = self
            .complete_json(
                "find_multiple_answers",
                prompts::multi_answer_system_prompt(columns),
                prompts::question_user_prompt(question, text),
            )
            .await?;
        parse_tuples(&reply, columns)
    }
}

// ── Reply parsing ────────────────────────────────────────────────────────

/// Parse a model reply as JSON, tolerating a ```json fence and prose around
/// the outermost object or array.
pub(crate) fn parse_json_reply(operation: &str, content: &str) -> Result<Value, ClientError> {
    let body = strip_json_fence(content);
    if let Ok(v) = serde_json::from_str::<Value>(body.trim()) {
        return Ok(v);
    }

    let start = body.find(['{', '[']);
    let end = body.rfind(['}', ']']);
    if let (Some(s), Some(e)) = (start, end) {
        if s < e {
            if let Ok(v) = serde_json::from_str::<Value>(&body[s..=e]) {
                return Ok(v);
            }
        }
    }

    let preview: String = content.chars().take(80).collect();
    Err(ClientError::malformed(
        operation,
        format!("reply is not JSON: {preview:?}"),
    ))
}

pub(crate) fn parse_translation(reply: &Value) -> Result<Translation, ClientError> {
    let obj = reply
        .as_object()
        .ok_or_else(|| ClientError::malformed("translate", "expected a JSON object"))?;
    let text = match obj.get("text") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => {
            return Err(ClientError::malformed("translate", "missing \"text\""));
        }
        Some(other) => value_to_text(other),
    };
    let lang = obj
        .get("lang")
        .or_else(|| obj.get("language"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    Ok(Translation { lang, text })
}

pub(crate) fn parse_sections(
    reply: &Value,
    known: &[String],
) -> Result<Vec<(String, String)>, ClientError> {
    let obj = reply
        .as_object()
        .ok_or_else(|| ClientError::malformed("isolate_sections", "expected a JSON object"))?;

    let mut out = Vec::new();
    for (name, value) in obj {
        if !known.iter().any(|k| k == name) {
            debug!("isolate_sections: ignoring unknown section '{}'", name);
            continue;
        }
        let text = match value {
            Value::Null => continue,
            Value::Array(items) => items
                .iter()
                .map(value_to_text)
                .collect::<Vec<_>>()
                .join("\n"),
            other => value_to_text(other),
        };
        if text.trim().is_empty() {
            continue;
        }
        out.push((name.clone(), text));
    }
    Ok(out)
}

pub(crate) fn parse_scored(operation: &str, reply: &Value) -> Result<ScoredText, ClientError> {
    let obj = reply
        .as_object()
        .ok_or_else(|| ClientError::malformed(operation, "expected {\"text\", \"score\"}"))?;
    let text = match obj.get("text") {
        Some(v) => value_to_text(v),
        None => return Err(ClientError::malformed(operation, "missing \"text\"")),
    };
    let score = obj
        .get("score")
        .and_then(score_of)
        .ok_or_else(|| ClientError::malformed(operation, "missing or non-numeric \"score\""))?;
    Ok(ScoredText { text, score })
}

pub(crate) fn parse_tuples(reply: &Value, columns: &[String]) -> Result<Vec<ScoredTuple>, ClientError> {
    const OP: &str = "find_multiple_answers";

    let items = match reply {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("answers") {
            Some(Value::Array(items)) => items,
            // Models sometimes name the list after the field instead.
            _ => obj
                .values()
                .find_map(Value::as_array)
                .ok_or_else(|| ClientError::malformed(OP, "no list of answers in reply"))?,
        },
        _ => return Err(ClientError::malformed(OP, "expected a list of answers")),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| ClientError::malformed(OP, "each answer must be an object"))?;
        let tuple = columns
            .iter()
            .map(|col| {
                let cell = match obj.get(col) {
                    Some(Value::Null) | None => ScoredText::new("", 0.0),
                    Some(v) => parse_scored(OP, v)?,
                };
                Ok((col.clone(), cell))
            })
            .collect::<Result<ScoredTuple, ClientError>>()?;
        out.push(tuple);
    }
    Ok(out)
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn score_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
