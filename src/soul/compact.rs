//! Token accounting and history compaction.
//!
//! The token counter tracks the API-reported usage of the latest response,
//! falling back to a chars/4 estimate. When the counter plus the reserved
//! headroom reaches the context limit, the older part of the LLM history
//! is summarized by the model itself and replaced with a single system
//! message, keeping the most recent exchange intact.

use crate::error::LlmError;
use crate::llm::{ChatMessage, ChatResponse, LlmClient};
use crate::soul::Soul;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Messages preserved verbatim at the end of the history.
pub const N_KEEP: usize = 2;

/// Rough chars-per-token ratio for English text and code.
const CHARS_PER_TOKEN: usize = 4;
/// Per-message overhead for role and formatting.
const MESSAGE_OVERHEAD: u64 = 4;

const SUMMARY_PREFIX: &str = "Conversation so far (summary): ";
const SUMMARIZE_INSTRUCTION: &str = "Summarize the following conversation faithfully and \
concisely. Preserve key decisions, file paths, commands, code changes, error messages, and \
open tasks; they are needed to continue the work.";

/// Estimate tokens for a text: `ceil(len / 4)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(CHARS_PER_TOKEN) as u64
}

/// Estimate tokens for a message history, with per-message overhead.
#[must_use]
pub fn estimate_history_tokens(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|msg| estimate_tokens(&msg.content) + MESSAGE_OVERHEAD)
        .sum()
}

impl Soul {
    /// Update the token counter from a response, preferring API-reported
    /// usage over the estimate.
    pub(crate) fn update_token_count(&mut self, response: &ChatResponse) {
        if response.usage.total_tokens > 0 {
            self.token_count = response.usage.total_tokens;
        } else {
            self.token_count = estimate_history_tokens(&self.llm_history);
        }
    }

    /// Whether the history is close enough to the context limit to compact.
    /// Monotone in the token counter; a zero limit disables compaction.
    pub(crate) fn should_compress(&self) -> bool {
        self.max_context > 0 && self.token_count + self.reserved_context >= self.max_context
    }

    /// Compact the history when the limit is approached.
    ///
    /// Keeps the last [`N_KEEP`] messages verbatim and replaces everything
    /// older with one system message holding an LLM-written summary. Does
    /// nothing when the threshold is not reached or the history is too
    /// short to be worth splitting.
    ///
    /// # Errors
    /// Propagates summarization failures; the caller surfaces them without
    /// aborting the turn.
    pub(crate) async fn maybe_compress(
        &mut self,
        cancel: &CancellationToken,
        client: &Arc<dyn LlmClient>,
    ) -> Result<(), LlmError> {
        if !self.should_compress() {
            return Ok(());
        }
        if self.llm_history.len() <= N_KEEP + 2 {
            return Ok(());
        }

        let split = self.llm_history.len() - N_KEEP;
        let older = &self.llm_history[..split];

        let request = vec![
            ChatMessage::system(SUMMARIZE_INSTRUCTION),
            ChatMessage::user(format_for_summary(older)),
        ];
        let response = client.chat(cancel, &request, None).await?;
        let summary = response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyResponse {
                message: "summarizer returned no choices".to_string(),
            })?;

        let original_len = self.llm_history.len();
        let mut compacted = Vec::with_capacity(1 + N_KEEP);
        compacted.push(ChatMessage::system(format!("{SUMMARY_PREFIX}{summary}")));
        compacted.extend_from_slice(&self.llm_history[split..]);
        self.llm_history = compacted;

        self.update_token_count(&response);
        info!(
            original_len,
            new_len = self.llm_history.len(),
            token_count = self.token_count,
            "history compacted"
        );
        Ok(())
    }
}

/// Render messages as plain text for the summarization prompt.
fn format_for_summary(messages: &[ChatMessage]) -> String {
    let mut output = String::new();
    for msg in messages {
        if msg.tool_calls.is_empty() {
            let _ = writeln!(output, "{}: {}", msg.role, msg.content);
        } else {
            for call in &msg.tool_calls {
                let _ = writeln!(
                    output,
                    "{}: [called tool {}({})]",
                    msg.role, call.function.name, call.function.arguments
                );
            }
        }
    }
    output
}
