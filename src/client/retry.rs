//! Bounded retry for collaborator calls.
//!
//! [`with_retry`] is the combinator: it takes the policy and a closure that
//! produces the call, and re-issues the call on any error until the attempt
//! budget is spent. [`RetryingClient`] applies it to every method of a
//! [`GenerativeClient`] so no call site can forget it.
//!
//! The delay between attempts is fixed, not exponential: the pipeline is
//! sequential, so there is no herd of workers to spread out. No delay is
//! taken after the last attempt.

use super::{GenerativeClient, ScoredText, ScoredTuple, Translation};
use crate::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// How often and how patiently a call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `call` until it succeeds or `policy.max_attempts` attempts failed.
///
/// Every error is retried. Exhaustion yields [`ClientError::Exhausted`]
/// carrying the last error's message.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let attempts = policy.attempts();
    let mut last = String::new();

    for attempt in 1..=attempts {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}/{}", operation, attempt, attempts);
                }
                return Ok(value);
            }
            Err(e) => {
                last = e.to_string();
                if attempt < attempts {
                    warn!(
                        "{}: attempt {}/{} failed: {}; retrying in {}ms",
                        operation, attempt, attempts, last, policy.delay_ms
                    );
                    sleep(policy.delay()).await;
                } else {
                    warn!("{}: attempt {}/{} failed: {}", operation, attempt, attempts, last);
                }
            }
        }
    }

    Err(ClientError::Exhausted {
        operation: operation.to_string(),
        attempts,
        last,
    })
}

/// Middleware applying one [`RetryPolicy`] to every call of `C`.
#[derive(Debug, Clone)]
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: GenerativeClient> GenerativeClient for RetryingClient<C> {
    async fn translate(&self, text: &str) -> Result<Translation, ClientError> {
        with_retry(&self.policy, "translate", || self.inner.translate(text)).await
    }

    async fn isolate_sections(
        &self,
        sections: &[String],
        text: &str,
    ) -> Result<Vec<(String, String)>, ClientError> {
        with_retry(&self.policy, "isolate_sections", || {
            self.inner.isolate_sections(sections, text)
        })
        .await
    }

    async fn answer_question(&self, question: &str, text: &str) -> Result<ScoredText, ClientError> {
        with_retry(&self.policy, "answer_question", || {
            self.inner.answer_question(question, text)
        })
        .await
    }

    async fn find_multiple_answers(
        &self,
        question: &str,
        columns: &[String],
        text: &str,
    ) -> Result<Vec<ScoredTuple>, ClientError> {
        with_retry(&self.policy, "find_multiple_answers", || {
            self.inner.find_multiple_answers(question, columns, text)
        })
        .await
    }
}
