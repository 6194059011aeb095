//! Append-only transcript of wire messages with persistence and
//! checkpointing.
//!
//! Readers always receive owned copies; the single writer is the agent
//! core. `save` writes only when the transcript changed since the last
//! save, and is called after each successful terminal response.

use crate::error::AgentError;
use crate::wire::{Checkpoint, WireMessage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use time::OffsetDateTime;

#[derive(Default)]
struct TranscriptState {
    messages: Vec<WireMessage>,
    modified: bool,
}

/// The conversation transcript shared between the core and the UI.
pub struct Transcript {
    state: RwLock<TranscriptState>,
    path: Option<PathBuf>,
}

impl Transcript {
    /// An in-memory transcript with no backing file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TranscriptState::default()),
            path: None,
        }
    }

    /// A transcript persisted at `path`.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            state: RwLock::new(TranscriptState::default()),
            path: Some(path.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, msg: WireMessage) {
        let mut state = self.write();
        state.messages.push(msg);
        state.modified = true;
    }

    pub fn append_many(&self, msgs: impl IntoIterator<Item = WireMessage>) {
        let mut state = self.write();
        state.messages.extend(msgs);
        state.modified = true;
    }

    /// A copy of all messages.
    #[must_use]
    pub fn messages(&self) -> Vec<WireMessage> {
        self.read().messages.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    /// A copy of the `min(n, len)` most recent messages; empty for n = 0.
    #[must_use]
    pub fn last_n(&self, n: usize) -> Vec<WireMessage> {
        let state = self.read();
        let start = state.messages.len().saturating_sub(n);
        state.messages[start..].to_vec()
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.messages.clear();
        state.modified = true;
    }

    /// Write the transcript to its file as a JSON array.
    ///
    /// A no-op when nothing changed since the last save or when the
    /// transcript has no path.
    ///
    /// # Errors
    /// Returns [`AgentError::Persistence`] on serialization or I/O failure.
    pub fn save(&self) -> Result<(), AgentError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut state = self.write();
        if !state.modified {
            return Ok(());
        }

        let data = serde_json::to_vec_pretty(&state.messages)
            .map_err(|e| AgentError::Persistence(format!("failed to encode transcript: {e}")))?;
        std::fs::write(path, data).map_err(|e| {
            AgentError::Persistence(format!("failed to write {}: {e}", path.display()))
        })?;

        state.modified = false;
        Ok(())
    }

    /// Load the transcript from its file, replacing current state.
    ///
    /// A missing file leaves the transcript empty; malformed JSON is an
    /// error.
    ///
    /// # Errors
    /// Returns [`AgentError::Persistence`] on read or parse failure.
    pub fn restore(&self) -> Result<(), AgentError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(AgentError::Persistence(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };

        let messages: Vec<WireMessage> = serde_json::from_slice(&data)
            .map_err(|e| AgentError::Persistence(format!("failed to parse transcript: {e}")))?;

        let mut state = self.write();
        state.messages = messages;
        state.modified = false;
        Ok(())
    }

    /// Snapshot the current messages into an immutable checkpoint.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.read();
        let context = serde_json::to_vec(&state.messages).unwrap_or_default();
        Checkpoint {
            id: next_checkpoint_id(),
            message_id: String::new(),
            timestamp: OffsetDateTime::now_utc(),
            context,
        }
    }

    /// Replace the transcript with a checkpoint's contents.
    ///
    /// # Errors
    /// Returns [`AgentError::Persistence`] when the checkpoint bytes do not
    /// parse.
    pub fn restore_checkpoint(&self, cp: &Checkpoint) -> Result<(), AgentError> {
        let messages: Vec<WireMessage> = serde_json::from_slice(&cp.context)
            .map_err(|e| AgentError::Persistence(format!("failed to parse checkpoint: {e}")))?;

        let mut state = self.write();
        state.messages = messages;
        state.modified = true;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TranscriptState> {
        self.state.read().expect("transcript lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TranscriptState> {
        self.state.write().expect("transcript lock poisoned")
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Checkpoint ids come from a monotonic nanosecond clock; ties bump by one
/// so ids stay unique within the process.
fn next_checkpoint_id() -> String {
    static LAST: AtomicI64 = AtomicI64::new(0);
    #[allow(clippy::cast_possible_truncation)]
    let now = OffsetDateTime::now_utc().unix_timestamp_nanos() as i64;
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(observed) => prev = observed,
        }
    }
}
