//! Single-turn model invocation with timeout and retry

use super::{ChatError, ChatModel};
use crate::db::{Message, NewMessage, Role};
use crate::llm::{LlmError, LlmMessage, LlmRequest, TextStream};
use futures::StreamExt;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Longest wait between attempts, regardless of what the provider asks for
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Upper bound for one model call (or one whole streamed reply)
    pub timeout: Duration,
    /// Extra attempts after a retryable failure
    pub max_retries: u32,
    /// First backoff step; doubles on each retry
    pub base_backoff: Duration,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 2,
            base_backoff: Duration::from_secs(1),
            system_prompt: None,
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

/// Turns a thread history plus a new user message into the assistant reply
pub struct TurnProcessor<M> {
    model: M,
    config: TurnConfig,
}

impl<M: ChatModel> TurnProcessor<M> {
    pub fn new(model: M, config: TurnConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Full ordered context for the model: prior messages, then the new one
    pub fn build_request(&self, history: &[Message], user_message: &str) -> LlmRequest {
        let mut messages: Vec<LlmMessage> = history
            .iter()
            .map(|m| match m.role {
                Role::User => LlmMessage::user(m.content.clone()),
                Role::Assistant => LlmMessage::assistant(m.content.clone()),
            })
            .collect();
        messages.push(LlmMessage::user(user_message));

        LlmRequest {
            system: self.config.system_prompt.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Obtain one complete assistant reply.
    ///
    /// Retryable provider failures are retried up to `max_retries` times.
    /// Nothing is stored here; the caller persists the turn.
    pub async fn process_turn(
        &self,
        history: &[Message],
        user_message: &str,
    ) -> Result<NewMessage, ChatError> {
        let request = self.build_request(history, user_message);
        let mut attempt = 0;

        loop {
            let result = tokio::time::timeout(self.config.timeout, self.model.complete(&request))
                .await
                .unwrap_or_else(|_| Err(self.timeout_error()));

            match result {
                Ok(response) if response.text.trim().is_empty() => {
                    return Err(LlmError::unknown("Model returned an empty reply").into());
                }
                Ok(response) => return Ok(NewMessage::assistant(response.text)),
                Err(e) if e.kind.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    self.wait_before_retry(&e, attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start a streamed reply.
    ///
    /// Only opening the stream is retried; once fragments flow, a failure ends
    /// the stream with an error item. The timeout bounds the whole reply.
    pub async fn stream_turn(
        &self,
        history: &[Message],
        user_message: &str,
    ) -> Result<TextStream, ChatError> {
        let request = self.build_request(history, user_message);
        let deadline = Instant::now() + self.config.timeout;
        let mut attempt = 0;

        let inner = loop {
            let result = tokio::time::timeout_at(deadline, self.model.stream(&request))
                .await
                .unwrap_or_else(|_| Err(self.timeout_error()));

            match result {
                Ok(stream) => break stream,
                Err(e) if e.kind.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    self.wait_before_retry(&e, attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let timeout_error = self.timeout_error();
        let bounded = async_stream::stream! {
            let mut inner = inner;
            loop {
                match tokio::time::timeout_at(deadline, inner.next()).await {
                    Ok(Some(item)) => {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        yield Err(timeout_error);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(bounded))
    }

    fn timeout_error(&self) -> LlmError {
        LlmError::timed_out(format!(
            "Model did not respond within {}s",
            self.config.timeout.as_secs()
        ))
    }

    async fn wait_before_retry(&self, error: &LlmError, attempt: u32) {
        let delay = backoff_delay(self.config.base_backoff, attempt, error.retry_after);
        tracing::warn!(
            model = self.model.model_id(),
            attempt,
            max_retries = self.config.max_retries,
            delay_ms = %delay.as_millis(),
            kind = error.kind.as_str(),
            error = %error.message,
            "Retrying model call"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff with jitter; a provider-supplied delay wins.
fn backoff_delay(base: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(after) = retry_after {
        return after.min(MAX_BACKOFF);
    }
    let exp = base.saturating_mul(1 << attempt.saturating_sub(1).min(16));
    let jitter_ceiling = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    };
    (exp + Duration::from_millis(jitter)).min(MAX_BACKOFF)
}
