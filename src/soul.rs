//! The agent core: a message-driven scheduler that owns the conversation
//! state and runs the LLM↔tool loop.
//!
//! A [`Soul`] receives wire messages through a bounded inbox, processes
//! them one at a time (strictly FIFO), and reports progress through
//! [`EventHandlers`]. Cancellation is cooperative: the shared signal is
//! observed at every suspension point and re-armed after it fires so a
//! fresh run can start.

pub mod compact;
pub mod events;
pub mod turn;


pub use events::EventHandlers;

use crate::approval::ApprovalManager;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::tools::{Tool, ToolError, ToolRegistry};
use crate::transcript::Transcript;
use crate::wire::{MessageKind, WireMessage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Inbox capacity; sends beyond it fail with [`AgentError::InboxFull`].
const INBOX_CAPACITY: usize = 100;

/// The execution environment shared by agents.
///
/// The runtime owns the tool registry, the LLM client, and the approval
/// policy. It outlives every agent referring to it.
pub struct Runtime {
    pub workdir: PathBuf,
    pub tools: ToolRegistry,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub approval: ApprovalManager,
    pub max_steps: usize,
    pub max_retries: u32,
}

impl Runtime {
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>, yolo: bool) -> Self {
        Self {
            workdir: workdir.into(),
            tools: ToolRegistry::new(),
            llm: None,
            approval: ApprovalManager::new(yolo),
            max_steps: 100,
            max_retries: 3,
        }
    }

    /// Register a tool before any soul starts; the registry is read-only
    /// during turns.
    ///
    /// # Errors
    /// Returns [`ToolError::Conflict`] when the name is taken.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        self.tools.register(tool)
    }
}

/// An agent configuration: a name, a system prompt, and the names of the
/// tools it is allowed to use.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub system_prompt: String,
    pub tool_names: Vec<String>,
    pub runtime: Arc<Runtime>,
}

impl Agent {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tool_names: Vec::new(),
            runtime,
        }
    }

    pub fn add_tool(&mut self, tool_name: impl Into<String>) {
        self.tool_names.push(tool_name.into());
    }
}

/// A re-armable cancellation signal.
///
/// `cancel` fires the current token and installs a fresh one under the same
/// lock, so every observer that obtained a token before `cancel` returned
/// sees the cancellation, and the next run starts with a clean signal.
#[derive(Clone, Default)]
pub struct CancelSignal {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The token observers should watch right now.
    #[must_use]
    pub fn current(&self) -> CancellationToken {
        self.token.lock().expect("cancel signal lock poisoned").clone()
    }

    /// Fire the current token and re-arm.
    pub fn cancel(&self) {
        let mut guard = self.token.lock().expect("cancel signal lock poisoned");
        guard.cancel();
        *guard = CancellationToken::new();
    }
}

/// A cloneable handle for feeding a running [`Soul`].
#[derive(Clone)]
pub struct SoulHandle {
    inbox: mpsc::Sender<WireMessage>,
    cancel: CancelSignal,
    running: Arc<AtomicBool>,
}

impl SoulHandle {
    /// Enqueue a message without blocking.
    ///
    /// # Errors
    /// Returns [`AgentError::InboxFull`] when the inbox is saturated or the
    /// loop is gone.
    pub fn send(&self, msg: WireMessage) -> Result<(), AgentError> {
        self.inbox.try_send(msg).map_err(|_| AgentError::InboxFull)
    }

    /// Raise the cancel signal for whatever is in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The core agent: owns the LLM history, the inbox, the cancel signal, the
/// token counter, and the event handlers. The transcript is shared with
/// the UI, which only ever reads copies.
pub struct Soul {
    pub agent: Agent,
    pub transcript: Arc<Transcript>,
    pub handlers: EventHandlers,

    pub(crate) llm_history: Vec<crate::llm::ChatMessage>,
    pub(crate) token_count: u64,
    pub(crate) max_context: u64,
    pub(crate) reserved_context: u64,

    inbox_tx: mpsc::Sender<WireMessage>,
    inbox_rx: mpsc::Receiver<WireMessage>,
    cancel: CancelSignal,
    done_tx: mpsc::Sender<()>,
    done_rx: Option<mpsc::Receiver<()>>,
    running: Arc<AtomicBool>,
}

impl Soul {
    #[must_use]
    pub fn new(agent: Agent, transcript: Arc<Transcript>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (done_tx, done_rx) = mpsc::channel(1);

        Self {
            agent,
            transcript,
            handlers: EventHandlers::default(),
            llm_history: Vec::new(),
            token_count: 0,
            max_context: 0,
            reserved_context: 0,
            inbox_tx,
            inbox_rx,
            cancel: CancelSignal::new(),
            done_tx,
            done_rx: Some(done_rx),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle for the UI side: send, cancel, running check.
    #[must_use]
    pub fn handle(&self) -> SoulHandle {
        SoulHandle {
            inbox: self.inbox_tx.clone(),
            cancel: self.cancel.clone(),
            running: Arc::clone(&self.running),
        }
    }

    /// Take the done receiver; one `()` arrives per fully processed
    /// message. Callable once.
    #[must_use]
    pub fn take_done(&mut self) -> Option<mpsc::Receiver<()>> {
        self.done_rx.take()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enqueue a message without blocking.
    ///
    /// # Errors
    /// Returns [`AgentError::InboxFull`] when the inbox is saturated.
    pub fn send(&self, msg: WireMessage) -> Result<(), AgentError> {
        self.inbox_tx.try_send(msg).map_err(|_| AgentError::InboxFull)
    }

    /// Raise the cancel signal; idempotent and re-armable.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Maximum context size in tokens; zero disables compaction.
    pub fn set_max_context(&mut self, tokens: u64) {
        self.max_context = tokens;
    }

    /// Tokens held back for the next completion.
    pub fn set_reserved_context(&mut self, tokens: u64) {
        self.reserved_context = tokens;
    }

    #[must_use]
    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    /// The main loop: wait on the inbox, process each message, signal done.
    ///
    /// Returns when `shutdown` fires, when the cancel signal fires between
    /// messages, or when every sender is gone.
    ///
    /// # Errors
    /// Returns [`AgentError::AlreadyRunning`] on reentrant start and
    /// [`AgentError::Cancelled`] when a cancellation ends the loop.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), AgentError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyRunning);
        }
        let result = self.run_inner(shutdown).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&mut self, shutdown: CancellationToken) -> Result<(), AgentError> {
        loop {
            let cancel = self.cancel.current();
            let msg = tokio::select! {
                () = shutdown.cancelled() => return Err(AgentError::Cancelled),
                () = cancel.cancelled() => return Err(AgentError::Cancelled),
                msg = self.inbox_rx.recv() => msg,
            };
            let Some(msg) = msg else {
                debug!("inbox closed; soul loop ending");
                return Ok(());
            };

            if let Err(err) = self.process_message(msg).await {
                if matches!(err, AgentError::Cancelled) {
                    // Cancellation is a normal outcome; only done is signalled.
                    debug!("turn cancelled");
                } else {
                    warn!(error = %err, "message processing failed");
                    self.handlers.emit_error(&err);
                }
            }

            // Exactly one done signal per message; drop when already set.
            let _ = self.done_tx.try_send(());
        }
    }

    /// Dispatch one wire message.
    ///
    /// # Errors
    /// Unknown message types fail with [`AgentError::UnknownMessageType`];
    /// the loop itself survives.
    pub(crate) async fn process_message(&mut self, msg: WireMessage) -> Result<(), AgentError> {
        match msg.kind {
            MessageKind::UserInput => self.handle_user_input(msg).await,
            MessageKind::Cancel => {
                self.cancel.cancel();
                Ok(())
            }
            other => Err(AgentError::UnknownMessageType(other.to_string())),
        }
    }

    /// Append the user message to the transcript and run the turn.
    pub(crate) async fn handle_user_input(&mut self, msg: WireMessage) -> Result<(), AgentError> {
        self.transcript.append(msg.clone());
        self.run_turn(&msg).await
    }
}
