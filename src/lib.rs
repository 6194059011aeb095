//! tandem — an interactive coding agent.
//!
//! The core is a message-driven scheduler ([`soul::Soul`]) that drives a
//! conversation between a human, an LLM, and a set of local tools: it
//! consumes wire messages from a bounded inbox, runs the LLM↔tool loop
//! under cancellation and step bounds, retries transient LLM failures
//! with jittered exponential backoff, compacts the conversation history
//! before the context window overflows, and reports progress through
//! event handlers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tandem::soul::{Agent, Runtime, Soul};
//! use tandem::transcript::Transcript;
//! use tandem::wire::{MessageKind, WireMessage};
//!
//! let mut runtime = Runtime::new(".", false);
//! runtime.llm = Some(client);
//! let agent = Agent::new("tandem", "You are a coding agent.", Arc::new(runtime));
//! let mut soul = Soul::new(agent, Arc::new(Transcript::new()));
//!
//! let handle = soul.handle();
//! tokio::spawn(async move { soul.run(shutdown).await });
//! handle.send(WireMessage::text(MessageKind::UserInput, "hello"))?;
//! ```

#![forbid(unsafe_code)]

pub mod approval;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod retry;
pub mod session;
pub mod soul;
pub mod tools;
pub mod transcript;
pub mod wire;

pub use approval::{ApprovalDecision, ApprovalLevel, ApprovalManager, ApprovalRequest};
pub use error::{AgentError, LlmError};
pub use llm::{HttpClient, LlmClient, RetryingClient};
pub use retry::RetryConfig;
pub use soul::{Agent, CancelSignal, EventHandlers, Runtime, Soul, SoulHandle};
pub use tools::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use transcript::Transcript;
pub use wire::{Checkpoint, ContentPart, MessageKind, WireMessage};
