//! Event fan-out from the core to a UI consumer.
//!
//! Handlers are plain fields; unset handlers are silently skipped. Every
//! invocation runs inside a fault boundary so a panicking handler cannot
//! corrupt the loop's state. Handlers must not block for long: UI
//! consumers are expected to forward events into their own channels.

use crate::approval::{ApprovalDecision, ApprovalRequest};
use crate::error::AgentError;
use crate::tools::{ToolCall, ToolResult};
use crate::wire::WireMessage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

pub type MessageHandler = Box<dyn Fn(&WireMessage) + Send + Sync>;
pub type ToolCallHandler = Box<dyn Fn(&ToolCall) + Send + Sync>;
pub type ToolResultHandler = Box<dyn Fn(&ToolResult) + Send + Sync>;
pub type ApprovalHandler = Box<dyn Fn(&ApprovalRequest) -> ApprovalDecision + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(&AgentError) + Send + Sync>;

/// Observable events of a [`crate::soul::Soul`].
#[derive(Default)]
pub struct EventHandlers {
    pub on_message: Option<MessageHandler>,
    pub on_tool_call: Option<ToolCallHandler>,
    pub on_tool_result: Option<ToolResultHandler>,
    pub on_approval_needed: Option<ApprovalHandler>,
    pub on_error: Option<ErrorHandler>,
}

impl EventHandlers {
    pub(crate) fn emit_message(&self, msg: &WireMessage) {
        if let Some(handler) = &self.on_message {
            guard("on_message", || handler(msg));
        }
    }

    pub(crate) fn emit_tool_call(&self, call: &ToolCall) {
        if let Some(handler) = &self.on_tool_call {
            guard("on_tool_call", || handler(call));
        }
    }

    pub(crate) fn emit_tool_result(&self, result: &ToolResult) {
        if let Some(handler) = &self.on_tool_result {
            guard("on_tool_result", || handler(result));
        }
    }

    pub(crate) fn emit_error(&self, err: &AgentError) {
        if let Some(handler) = &self.on_error {
            guard("on_error", || handler(err));
        }
    }

    /// Ask the consumer to decide on a pending tool call.
    ///
    /// With no handler installed (or a panicking one) the call is denied:
    /// nothing executes without an explicit decision.
    pub(crate) fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision {
        match &self.on_approval_needed {
            Some(handler) => guard("on_approval_needed", || handler(request))
                .unwrap_or(ApprovalDecision::Deny),
            None => ApprovalDecision::Deny,
        }
    }
}

/// Run a handler behind a panic boundary.
fn guard<T>(name: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            error!(handler = name, "event handler panicked");
            None
        }
    }
}
