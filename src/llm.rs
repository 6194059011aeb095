//! LLM client abstraction and the OpenAI-compatible wire schema.

pub mod http;
pub mod retrying;
pub mod types;

pub use http::HttpClient;
pub use retrying::RetryingClient;
pub use types::*;

use crate::error::LlmError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A chat-completion client.
///
/// `chat` is the non-streaming call the agent loop consumes. `stream` is
/// part of the contract for other callers; response chunks arrive on the
/// first channel and a transport failure, if any, on the second.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
    ) -> Result<ChatResponse, LlmError>;

    fn stream(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
        tools: Option<&[ToolDef]>,
    ) -> (mpsc::Receiver<ChatResponse>, mpsc::Receiver<LlmError>);
}
