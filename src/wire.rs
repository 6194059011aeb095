//! Wire protocol between the UI and the agent core.
//!
//! A [`WireMessage`] is the unit of the transcript: a timestamped, typed
//! record with a sequence of content parts. Tool calls and results also
//! travel as typed records ([`crate::tools::ToolCall`],
//! [`crate::tools::ToolResult`]); their wire messages exist for display and
//! persistence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// The type tag of a wire message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    // Input messages
    UserInput,
    Cancel,

    // Output messages
    Assistant,
    ToolCall,
    ToolResult,
    Error,
    System,
    Checkpoint,
    Clear,

    // Status messages
    Status,
    Progress,
    Done,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserInput => "user_input",
            Self::Cancel => "cancel",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::System => "system",
            Self::Checkpoint => "checkpoint",
            Self::Clear => "clear",
            Self::Status => "status",
            Self::Progress => "progress",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// One part of a message body.
///
/// `kind` is `"text"` for plain text, `"json"` for embedded JSON bytes, or a
/// MIME-tagged binary blob. Byte fields are base64 in the persisted form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub json: Vec<u8>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl ContentPart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn json(bytes: Vec<u8>) -> Self {
        Self {
            kind: "json".to_string(),
            json: bytes,
            ..Self::default()
        }
    }
}

/// A message on the wire between UI and core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl WireMessage {
    #[must_use]
    pub fn new(kind: MessageKind, content: Vec<ContentPart>) -> Self {
        Self {
            kind,
            id: String::new(),
            parent_id: String::new(),
            content,
            metadata: HashMap::new(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Build a message with a single text part. This is the constructor for
    /// `user_input` and `assistant` messages, which always carry text.
    #[must_use]
    pub fn text(kind: MessageKind, text: impl Into<String>) -> Self {
        Self::new(kind, vec![ContentPart::text(text)])
    }

    /// The text of the first `"text"` content part, or the empty string.
    #[must_use]
    pub fn first_text(&self) -> &str {
        self.content
            .iter()
            .find(|part| part.kind == "text")
            .map_or("", |part| part.text.as_str())
    }
}

/// An immutable snapshot of a transcript.
///
/// `context` holds the JSON-encoded message array at snapshot time and can
/// be restored into a [`crate::transcript::Transcript`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<u8>,
}

/// Serde helper: `Vec<u8>` as a base64 string, matching the persisted
/// transcript format.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
