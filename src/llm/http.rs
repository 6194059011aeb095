//! HTTP transport for OpenAI-compatible chat-completion APIs.

use crate::error::LlmError;
use crate::llm::types::{ChatMessage, ChatRequest, ChatResponse, ToolDef};
use crate::llm::LlmClient;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE: &str = "[DONE]";

/// Configuration for [`HttpClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request timeout; zero means the 120 s default.
    pub timeout: Duration,
}

/// A chat-completion client over an OpenAI-compatible HTTP endpoint.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpClient {
    /// Build a client from config.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(cfg: ClientConfig) -> Result<Self, LlmError> {
        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::network("client setup", e))?;

        Ok(Self {
            http,
            base_url: cfg.base_url,
            api_key: cfg.api_key,
            model: cfg.model,
            timeout,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream,
            temperature: None,
            max_tokens: None,
            tools: tools.map(<[ToolDef]>::to_vec),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::timeout("chat/completions", self.timeout)
        } else {
            LlmError::network("chat/completions", err)
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "LLM request rejected");
            return Err(LlmError::api(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for HttpClient {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
    ) -> Result<ChatResponse, LlmError> {
        let body = self.build_request(messages, tools, false);
        debug!(model = %self.model, messages = messages.len(), "LLM request");

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = self.send(&body) => result?,
        };

        let bytes = tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = response.bytes() => {
                result.map_err(|e| LlmError::network("read response body", e))?
            }
        };

        let parsed: ChatResponse = serde_json::from_slice(&bytes)?;
        debug!(
            id = %parsed.id,
            total_tokens = parsed.usage.total_tokens,
            "LLM response"
        );
        Ok(parsed)
    }

    fn stream(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
    ) -> (mpsc::Receiver<ChatResponse>, mpsc::Receiver<LlmError>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(32);
        let (err_tx, err_rx) = mpsc::channel(1);

        let body = self.build_request(messages, tools, true);
        let http = self.http.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();
        let timeout = self.timeout;
        let cancel = cancel.clone();

        tokio::spawn(async move {
            if let Err(err) =
                run_stream(http, url, api_key, timeout, body, &cancel, &chunk_tx).await
            {
                let _ = err_tx.send(err).await;
            }
        });

        (chunk_rx, err_rx)
    }
}

async fn run_stream(
    http: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
    body: ChatRequest,
    cancel: &CancellationToken,
    chunk_tx: &mpsc::Sender<ChatResponse>,
) -> Result<(), LlmError> {
    let response = tokio::select! {
        () = cancel.cancelled() => return Err(LlmError::Cancelled),
        result = http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .bearer_auth(&api_key)
            .json(&body)
            .send() => {
            result.map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout("chat/completions (stream)", timeout)
                } else {
                    LlmError::network("chat/completions (stream)", e)
                }
            })?
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::api(status.as_u16(), body));
    }

    let mut bytes = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            chunk = bytes.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|e| LlmError::network("read stream", e))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Process every complete line; a trailing partial stays buffered.
        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            match parse_sse_line(line.trim_end()) {
                SseLine::Chunk(response) => {
                    if chunk_tx.send(response).await.is_err() {
                        return Ok(());
                    }
                }
                SseLine::Done => return Ok(()),
                SseLine::Skip => {}
            }
        }
    }

    Ok(())
}

enum SseLine {
    Chunk(ChatResponse),
    Done,
    Skip,
}

/// Parse one SSE line. Comment lines (`:`), blanks, non-data fields, and
/// malformed chunks are skipped.
fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return SseLine::Skip;
    };
    if data == SSE_DONE {
        return SseLine::Done;
    }
    match serde_json::from_str::<ChatResponse>(data) {
        Ok(chunk) => SseLine::Chunk(chunk),
        Err(_) => SseLine::Skip,
    }
}
