//! The turn loop: call the LLM, execute requested tools, feed results
//! back, and stop at the first tool-free reply.

use crate::approval::ApprovalDecision;
use crate::error::{AgentError, LlmError};
use crate::llm::{ChatMessage, ToolDef};
use crate::soul::Soul;
use crate::tools::{ToolCall, ToolResult};
use crate::wire::{MessageKind, WireMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const EMPTY_RESPONSE_PLACEHOLDER: &str = "(empty response)";
const NO_CLIENT_MESSAGE: &str = "LLM client is not configured. Please set the provider's \
base URL, API key, and model in the configuration or environment.";
const DENIED_BY_USER: &str = "denied by user";

impl Soul {
    /// Run one turn for `user_msg`, already appended to the transcript.
    pub(crate) async fn run_turn(&mut self, user_msg: &WireMessage) -> Result<(), AgentError> {
        let Some(client) = self.agent.runtime.llm.clone() else {
            // No client configured: reply with a friendly assistant message
            // instead of an error.
            let response = WireMessage::text(MessageKind::Assistant, NO_CLIENT_MESSAGE);
            self.transcript.append(response.clone());
            self.handlers.emit_message(&response);
            return Ok(());
        };

        let cancel = self.cancel.current();
        let user_text = user_msg.first_text().to_string();
        self.llm_history.push(ChatMessage::user(user_text));

        // Compaction failures are reported but never abort the turn.
        if let Err(err) = self.maybe_compress(&cancel, &client).await {
            warn!(error = %err, "history compaction failed");
            self.handlers.emit_error(&AgentError::Llm(err));
        }

        let mut messages = self.build_messages();
        let tool_defs = self.build_tool_defs();

        let max_steps = self.agent.runtime.max_steps;
        for step in 0..max_steps {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let response = client
                .chat(&cancel, &messages, tool_defs.as_deref())
                .await
                .map_err(|err| match err {
                    LlmError::Cancelled => AgentError::Cancelled,
                    other => AgentError::Llm(other),
                })?;

            let Some(choice) = response.choices.first() else {
                return Err(AgentError::EmptyLlmResponse);
            };
            let assistant_msg = choice.message.clone();
            debug!(step, tool_calls = assistant_msg.tool_calls.len(), "LLM step");

            self.llm_history.push(assistant_msg.clone());
            messages.push(assistant_msg.clone());
            self.update_token_count(&response);

            if assistant_msg.tool_calls.is_empty() {
                // Terminal response: no tools requested.
                let text = if assistant_msg.content.is_empty() {
                    EMPTY_RESPONSE_PLACEHOLDER.to_string()
                } else {
                    assistant_msg.content
                };
                let response = WireMessage::text(MessageKind::Assistant, text);
                self.transcript.append(response.clone());
                self.handlers.emit_message(&response);
                if let Err(err) = self.transcript.save() {
                    warn!(error = %err, "transcript save failed");
                }
                return Ok(());
            }

            for info in &assistant_msg.tool_calls {
                let call = ToolCall {
                    id: info.id.clone(),
                    name: info.function.name.clone(),
                    arguments: info.function.arguments.clone().into_bytes(),
                };
                self.handlers.emit_tool_call(&call);

                let call_msg = WireMessage::text(
                    MessageKind::ToolCall,
                    format!("Calling tool: {}({})", call.name, info.function.arguments),
                );
                self.transcript.append(call_msg.clone());
                self.handlers.emit_message(&call_msg);

                let result = self.gated_tool_call(&cancel, &call).await;

                // The UI sees the full result; the LLM a bounded copy.
                self.handlers.emit_tool_result(&result);
                let llm_result = result.truncate_for_llm();
                let result_text = llm_result.text_for_llm();

                let result_msg = WireMessage::text(MessageKind::ToolResult, result_text.clone());
                self.transcript.append(result_msg.clone());
                self.handlers.emit_message(&result_msg);

                let tool_msg = ChatMessage::tool(result_text, &call.id);
                self.llm_history.push(tool_msg.clone());
                messages.push(tool_msg);
            }
        }

        Err(AgentError::MaxStepsExceeded(max_steps))
    }

    /// Apply the approval gate, then execute.
    async fn gated_tool_call(&self, cancel: &CancellationToken, call: &ToolCall) -> ToolResult {
        let approval = &self.agent.runtime.approval;
        if !approval.is_approved(&call.name) {
            let request = approval.new_request(&call.id, &call.name, call.arguments_text());
            match self.handlers.request_approval(&request) {
                ApprovalDecision::ApproveOnce => approval.approve_once(&call.name),
                ApprovalDecision::ApproveSession => approval.approve_for_session(&call.name),
                ApprovalDecision::Deny => {
                    return ToolResult::failure(&call.id, DENIED_BY_USER);
                }
            }
        }
        self.execute_tool_call(cancel, call).await
    }

    /// Execute a tool call. Failures of any kind become failed results;
    /// the turn never ends because a tool misbehaved.
    pub(crate) async fn execute_tool_call(
        &self,
        cancel: &CancellationToken,
        call: &ToolCall,
    ) -> ToolResult {
        let tool = match self.agent.runtime.tools.get(&call.name) {
            Ok(tool) => tool.clone(),
            Err(err) => return ToolResult::failure(&call.id, err.to_string()),
        };

        match tool.invoke(cancel, &call.arguments).await {
            Ok(value) => match serde_json::to_string(&value) {
                Ok(encoded) => ToolResult::success(&call.id, encoded),
                Err(err) => {
                    ToolResult::failure(&call.id, format!("failed to encode tool result: {err}"))
                }
            },
            Err(err) => ToolResult::failure(&call.id, err.to_string()),
        }
    }

    /// The system prompt (when non-empty) followed by the LLM history.
    pub(crate) fn build_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.llm_history.len() + 1);
        if !self.agent.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.agent.system_prompt.clone()));
        }
        messages.extend(self.llm_history.iter().cloned());
        messages
    }

    /// The tool catalog for the transport; `None` when no tools are
    /// registered so the request omits the field.
    pub(crate) fn build_tool_defs(&self) -> Option<Vec<ToolDef>> {
        let infos = self.agent.runtime.tools.describe_all();
        if infos.is_empty() {
            return None;
        }
        Some(
            infos
                .into_iter()
                .map(|info| ToolDef::function(info.name, info.description, info.parameters))
                .collect(),
        )
    }
}
