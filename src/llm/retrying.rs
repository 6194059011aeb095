//! A client wrapper that retries transient `chat` failures.

use crate::error::LlmError;
use crate::llm::types::{ChatMessage, ChatResponse, ToolDef};
use crate::llm::LlmClient;
use crate::retry::{run_with_retry, RetryConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wraps an [`LlmClient`], routing `chat` through the retry executor.
///
/// Streams are not retried; `stream` delegates to the inner client.
pub struct RetryingClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingClient {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    #[must_use]
    pub fn with_defaults(inner: Arc<dyn LlmClient>) -> Self {
        Self::new(inner, RetryConfig::default())
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
    ) -> Result<ChatResponse, LlmError> {
        run_with_retry(
            cancel,
            &self.config,
            || self.inner.chat(cancel, messages, tools),
            LlmError::is_retryable,
            |attempt, err, delay| {
                info!(
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying LLM request"
                );
            },
        )
        .await
    }

    fn stream(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
    ) -> (mpsc::Receiver<ChatResponse>, mpsc::Receiver<LlmError>) {
        self.inner.stream(cancel, messages, tools)
    }
}
