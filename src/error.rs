//! Failure taxonomy for the agent core.
//!
//! [`LlmError`] classifies transport failures into retryable and terminal
//! kinds; [`AgentError`] covers the agent loop itself. Tool failures are
//! never errors at this level: they travel back to the LLM as
//! [`crate::tools::ToolResult`] values with `success == false`.

use std::time::Duration;
use thiserror::Error;

/// HTTP status codes that warrant a retry.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// An error from the LLM transport or its response handling.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The API returned a non-success status.
    #[error("API error{}: {message}", fmt_status(.status))]
    Api {
        status: u16,
        message: String,
        body: String,
    },

    /// A connection-level failure (DNS, refused, reset, broken pipe).
    #[error("network error ({op}): {source}")]
    Network {
        op: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation exceeded its deadline.
    #[error("timeout error ({op} after {duration:?})")]
    Timeout { op: String, duration: Duration },

    /// A well-formed response with no usable choice.
    #[error("empty response{}", fmt_detail(.message))]
    EmptyResponse { message: String },

    /// The body arrived but could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Cancellation was observed while the operation was in flight.
    #[error("cancelled")]
    Cancelled,

    /// The retry executor gave up.
    #[error("max retries ({max_retries}) exceeded: {source}")]
    MaxRetriesExceeded {
        max_retries: u32,
        #[source]
        source: Box<LlmError>,
    },
}

fn fmt_status(status: &u16) -> String {
    if *status > 0 {
        format!(" (status {status})")
    } else {
        String::new()
    }
}

fn fmt_detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl LlmError {
    #[must_use]
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::Api {
            status,
            message: body.clone(),
            body,
        }
    }

    #[must_use]
    pub fn network(
        op: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            op: op.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn timeout(op: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            op: op.into(),
            duration,
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// API errors retry only on 429 and the 5xx gateway statuses; network,
    /// timeout, and empty-response failures always retry; everything else
    /// is terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
            Self::Network { .. } | Self::Timeout { .. } | Self::EmptyResponse { .. } => true,
            Self::Decode(_) | Self::Cancelled | Self::MaxRetriesExceeded { .. } => false,
        }
    }
}

/// An error from the agent loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("soul is already running")]
    AlreadyRunning,

    #[error("message channel is full")]
    InboxFull,

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("LLM returned no choices")]
    EmptyLlmResponse,

    #[error("agent loop exceeded maximum steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("cancelled")]
    Cancelled,

    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("persistence error: {0}")]
    Persistence(String),
}
