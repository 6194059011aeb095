//! Tool definition, registry, and the LLM-visible output truncation rule.
//!
//! Tools let the LLM act on the local machine. A tool exposes a name, a
//! description, a JSON-schema parameter object, and an `invoke` operation
//! taking raw JSON argument bytes plus a cancellation token. Side effects
//! are permitted and expected.

pub mod file;
pub mod shell;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Upper bound on the total characters of a tool result shown to the LLM.
pub const MAX_TOOL_OUTPUT_TOTAL_CHARS: usize = 50_000;
/// Upper bound on any single line of a tool result shown to the LLM.
pub const MAX_TOOL_OUTPUT_LINE_CHARS: usize = 2_000;

const TRUNCATION_TRAILER: &str = "\n... (output truncated)";

/// A tool callable by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Human-readable description, sent to the LLM.
    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool.
    ///
    /// `args` is the raw JSON argument object produced by the LLM; its
    /// shape is defined by [`Tool::parameters`]. The returned value is
    /// JSON-encoded into the result fed back to the LLM.
    ///
    /// # Errors
    /// Returns an error when the arguments are invalid or execution fails;
    /// the caller converts it into a failed [`ToolResult`], never into a
    /// turn-ending error.
    async fn invoke(&self, cancel: &CancellationToken, args: &[u8]) -> Result<serde_json::Value>;
}

/// Registry failures.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {0:?} already registered")]
    Conflict(String),

    #[error("tool {0:?} not found")]
    NotFound(String),
}

/// Name, description, and parameter schema of a registered tool.
#[derive(Clone, Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Name-keyed collection of tools.
///
/// Populated before the agent loop starts; read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    /// Returns [`ToolError::Conflict`] when the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Conflict(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    ///
    /// # Errors
    /// Returns [`ToolError::NotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All registered tools, sorted by name for a stable catalog order.
    #[must_use]
    pub fn describe_all(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Execute a tool by name.
    ///
    /// # Errors
    /// Registry misses surface as [`ToolError::NotFound`]; tool failures
    /// propagate from [`Tool::invoke`].
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        name: &str,
        args: &[u8],
    ) -> Result<serde_json::Value> {
        let tool = self.get(name)?;
        tool.invoke(cancel, args).await
    }
}

/// A structured tool request extracted from an LLM response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Vec<u8>,
}

impl ToolCall {
    #[must_use]
    pub fn arguments_text(&self) -> String {
        String::from_utf8_lossy(&self.arguments).into_owned()
    }
}

/// The outcome of one tool call.
///
/// Exactly one of `result`/`error` is meaningful depending on `success`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ToolResult {
    #[must_use]
    pub fn success(call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            result: result.into(),
            error: String::new(),
        }
    }

    #[must_use]
    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            result: String::new(),
            error: error.into(),
        }
    }

    /// The text fed back to the LLM for this result.
    #[must_use]
    pub fn text_for_llm(&self) -> String {
        if self.success {
            self.result.clone()
        } else {
            format!("Error: {}", self.error)
        }
    }

    /// A copy with oversized output cut down for the LLM.
    ///
    /// UI events always receive the untruncated original.
    #[must_use]
    pub fn truncate_for_llm(&self) -> Self {
        let mut truncated = self.clone();
        if self.success {
            truncated.result = truncate_text(
                &self.result,
                MAX_TOOL_OUTPUT_TOTAL_CHARS,
                MAX_TOOL_OUTPUT_LINE_CHARS,
            );
        } else {
            truncated.error = truncate_text(
                &self.error,
                MAX_TOOL_OUTPUT_TOTAL_CHARS,
                MAX_TOOL_OUTPUT_LINE_CHARS,
            );
        }
        truncated
    }
}

/// Cut `text` to at most `max_line` characters per line and `max_total`
/// characters overall.
///
/// When anything is cut, the result ends with a truncation trailer; input
/// already within both bounds is returned unchanged.
#[must_use]
pub fn truncate_text(text: &str, max_total: usize, max_line: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    let mut used = 0usize;
    let mut truncated = false;

    for (i, raw_line) in text.split('\n').enumerate() {
        let mut line = raw_line;
        let mut line_chars = line.chars().count();
        if line_chars > max_line {
            let cut = line
                .char_indices()
                .nth(max_line)
                .map_or(line.len(), |(idx, _)| idx);
            line = &line[..cut];
            line_chars = max_line;
            truncated = true;
        }

        // The terminator for the previous line counts against the budget.
        let separator = usize::from(i > 0);
        if used + separator + line_chars > max_total {
            let room = max_total.saturating_sub(used + separator);
            if separator == 1 && used < max_total {
                output.push('\n');
            }
            let prefix_len = line
                .char_indices()
                .nth(room)
                .map_or(line.len(), |(idx, _)| idx);
            output.push_str(&line[..prefix_len]);
            truncated = true;
            break;
        }

        if separator == 1 {
            output.push('\n');
        }
        output.push_str(line);
        used += separator + line_chars;
    }

    if truncated {
        output.push_str(TRUNCATION_TRAILER);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MockTool;

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "mock"
        }

        fn description(&self) -> &str {
            "A mock tool for testing"
        }

        fn parameters(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                }
            })
        }

        async fn invoke(
            &self,
            _cancel: &CancellationToken,
            args: &[u8],
        ) -> Result<serde_json::Value> {
            let parsed: serde_json::Value = serde_json::from_slice(args)?;
            let message = parsed
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("no message");
            Ok(json!({ "echo": message }))
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool)).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("mock").is_ok());
        assert!(matches!(
            registry.get("nonexistent"),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool)).unwrap();
        let err = registry.register(Arc::new(MockTool)).unwrap_err();
        assert!(matches!(err, ToolError::Conflict(name) if name == "mock"));
    }

    #[test]
    fn describe_all_is_sorted() {
        struct Named(&'static str);

        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                "named"
            }
            fn parameters(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            async fn invoke(
                &self,
                _cancel: &CancellationToken,
                _args: &[u8],
            ) -> Result<serde_json::Value> {
                Ok(json!(null))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Named("zeta"))).unwrap();
        registry.register(Arc::new(Named("alpha"))).unwrap();

        let names: Vec<_> = registry.describe_all().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn execute_runs_the_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool)).unwrap();

        let cancel = CancellationToken::new();
        let value = registry
            .execute(&cancel, "mock", br#"{"message":"hi"}"#)
            .await
            .unwrap();
        assert_eq!(value, json!({ "echo": "hi" }));
    }

    #[tokio::test]
    async fn execute_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let cancel = CancellationToken::new();
        assert!(registry.execute(&cancel, "nope", b"{}").await.is_err());
    }

    #[test]
    fn result_text_for_llm() {
        let ok = ToolResult::success("c1", "output");
        assert_eq!(ok.text_for_llm(), "output");

        let failed = ToolResult::failure("c2", "boom");
        assert_eq!(failed.text_for_llm(), "Error: boom");
    }

    // --- truncation ---

    #[test]
    fn short_text_unchanged() {
        assert_eq!(truncate_text("short text", 100, 50), "short text");
    }

    #[test]
    fn empty_text_stays_empty() {
        assert_eq!(truncate_text("", 100, 50), "");
    }

    #[test]
    fn exactly_at_limit_unchanged() {
        let text = "a".repeat(100);
        assert_eq!(truncate_text(&text, 100, 2000), text);
    }

    #[test]
    fn long_line_is_cut_with_trailer() {
        let text = "a".repeat(3000);
        let want = format!("{}{TRUNCATION_TRAILER}", "a".repeat(2000));
        assert_eq!(truncate_text(&text, 50_000, 2000), want);
    }

    #[test]
    fn per_line_cut_preserves_short_lines() {
        let long_line = "a".repeat(2500);
        let text = format!("short line\n{long_line}\nanother short line");
        let result = truncate_text(&text, 50_000, 2000);

        assert!(result.contains("short line"));
        assert!(result.contains("another short line"));
        assert!(result.contains(&"a".repeat(2000)));
        assert!(!result.contains(&"a".repeat(2001)));
        assert!(result.ends_with(TRUNCATION_TRAILER));
    }

    #[test]
    fn total_budget_is_enforced() {
        let lines: Vec<String> = (0..100).map(|_| "x".repeat(1000)).collect();
        let text = lines.join("\n");
        let result = truncate_text(&text, 50_000, 2000);

        assert!(result.len() <= 50_000 + TRUNCATION_TRAILER.len());
        assert!(result.ends_with(TRUNCATION_TRAILER));
    }

    #[test]
    fn truncation_boundary_scenario() {
        // 52,000 chars where one line is 2,500 chars and the rest stay
        // within the line bound: the LLM copy holds exactly 50,000 chars
        // plus the trailer, the long line cut to 2,000.
        let mut lines = vec!["b".repeat(2500)];
        for _ in 0..24 {
            lines.push("c".repeat(2000));
        }
        lines.push("c".repeat(1475));
        let text = lines.join("\n");
        assert_eq!(text.chars().count(), 52_000);

        let result = truncate_text(&text, MAX_TOOL_OUTPUT_TOTAL_CHARS, MAX_TOOL_OUTPUT_LINE_CHARS);
        let body = result.strip_suffix(TRUNCATION_TRAILER).unwrap();
        assert_eq!(body.chars().count(), 50_000);
        assert!(body.starts_with(&"b".repeat(2000)));
        assert!(!body.contains(&"b".repeat(2001)));
    }

    #[test]
    fn truncate_for_llm_leaves_original_untouched() {
        let original = ToolResult::success("c1", "a".repeat(MAX_TOOL_OUTPUT_TOTAL_CHARS + 100));
        let truncated = original.truncate_for_llm();

        assert!(truncated.result.ends_with(TRUNCATION_TRAILER));
        assert_eq!(
            original.result.len(),
            MAX_TOOL_OUTPUT_TOTAL_CHARS + 100,
            "original is not modified"
        );
    }

    #[test]
    fn truncate_for_llm_applies_to_error_field() {
        let failed = ToolResult::failure("c1", "e".repeat(MAX_TOOL_OUTPUT_TOTAL_CHARS + 100));
        let truncated = failed.truncate_for_llm();
        assert!(truncated.error.ends_with(TRUNCATION_TRAILER));
        assert!(truncated.result.is_empty());
    }
}
