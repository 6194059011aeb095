//! Approval policy for tool execution.
//!
//! The manager tracks the session's approval level, which tools the user
//! has approved for the whole session, and which tools are flagged as
//! dangerous. Unknown tools are non-dangerous by default.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// How tool executions get approved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalLevel {
    /// Ask before every tool execution.
    #[default]
    PerRequest,
    /// Tools approved once stay approved for the session.
    Session,
    /// Approve everything unconditionally.
    #[serde(rename = "yolo")]
    AutoApproveAll,
}

impl std::fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PerRequest => "per-request",
            Self::Session => "session",
            Self::AutoApproveAll => "yolo",
        };
        f.write_str(s)
    }
}

/// The decision a user hands back for a pending tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Allow this call only; approval state is not mutated.
    ApproveOnce,
    /// Allow this call and add the tool to the session-approved set.
    ApproveSession,
    /// Reject the call; the tool is not executed.
    Deny,
}

/// A pending request for user approval.
#[derive(Clone, Debug)]
pub struct ApprovalRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub is_dangerous: bool,
}

impl std::fmt::Display for ApprovalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dangerous = if self.is_dangerous { " [DANGEROUS]" } else { "" };
        write!(f, "{}{}: {}", self.tool_name, dangerous, self.arguments)
    }
}

#[derive(Debug, Default)]
struct ApprovalState {
    level: ApprovalLevel,
    session_approved: HashSet<String>,
    dangerous: HashMap<String, bool>,
}

/// Tracks approval decisions for tool execution.
#[derive(Debug)]
pub struct ApprovalManager {
    state: Mutex<ApprovalState>,
}

impl ApprovalManager {
    /// `yolo` selects [`ApprovalLevel::AutoApproveAll`].
    ///
    /// Shell commands start flagged dangerous; file operations do not.
    #[must_use]
    pub fn new(yolo: bool) -> Self {
        let level = if yolo {
            ApprovalLevel::AutoApproveAll
        } else {
            ApprovalLevel::PerRequest
        };

        let mut dangerous = HashMap::new();
        dangerous.insert("shell".to_string(), true);
        dangerous.insert("file".to_string(), false);

        Self {
            state: Mutex::new(ApprovalState {
                level,
                session_approved: HashSet::new(),
                dangerous,
            }),
        }
    }

    #[must_use]
    pub fn level(&self) -> ApprovalLevel {
        self.lock().level
    }

    pub fn set_level(&self, level: ApprovalLevel) {
        self.lock().level = level;
    }

    /// Whether a call to `tool_name` may run without asking the user.
    #[must_use]
    pub fn is_approved(&self, tool_name: &str) -> bool {
        let state = self.lock();
        match state.level {
            ApprovalLevel::AutoApproveAll => true,
            ApprovalLevel::Session => state.session_approved.contains(tool_name),
            ApprovalLevel::PerRequest => false,
        }
    }

    /// Single-shot approval mutates nothing; the decision itself is what
    /// the loop acts on.
    pub fn approve_once(&self, _tool_name: &str) {}

    pub fn approve_for_session(&self, tool_name: &str) {
        self.lock().session_approved.insert(tool_name.to_string());
    }

    pub fn revoke_session(&self, tool_name: &str) {
        self.lock().session_approved.remove(tool_name);
    }

    #[must_use]
    pub fn is_session_approved(&self, tool_name: &str) -> bool {
        self.lock().session_approved.contains(tool_name)
    }

    #[must_use]
    pub fn is_dangerous(&self, tool_name: &str) -> bool {
        self.lock().dangerous.get(tool_name).copied().unwrap_or(false)
    }

    pub fn set_dangerous(&self, tool_name: &str, dangerous: bool) {
        self.lock().dangerous.insert(tool_name.to_string(), dangerous);
    }

    /// All session-approved tool names, sorted.
    #[must_use]
    pub fn approved_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.lock().session_approved.iter().cloned().collect();
        tools.sort();
        tools
    }

    pub fn clear_session(&self) {
        self.lock().session_approved.clear();
    }

    #[must_use]
    pub fn new_request(
        &self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> ApprovalRequest {
        let tool_name = tool_name.into();
        ApprovalRequest {
            tool_call_id: call_id.into(),
            is_dangerous: self.is_dangerous(&tool_name),
            tool_name,
            arguments: arguments.into(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ApprovalState> {
        self.state.lock().expect("approval state lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_request_never_auto_approves() {
        let manager = ApprovalManager::new(false);
        assert_eq!(manager.level(), ApprovalLevel::PerRequest);
        assert!(!manager.is_approved("shell"));
        assert!(!manager.is_approved("file"));
    }

    #[test]
    fn yolo_approves_everything() {
        let manager = ApprovalManager::new(true);
        assert_eq!(manager.level(), ApprovalLevel::AutoApproveAll);
        assert!(manager.is_approved("shell"));
        assert!(manager.is_approved("anything"));
    }

    #[test]
    fn session_level_tracks_the_approved_set() {
        let manager = ApprovalManager::new(false);
        manager.set_level(ApprovalLevel::Session);

        assert!(!manager.is_approved("shell"));
        manager.approve_for_session("shell");
        assert!(manager.is_approved("shell"));
        assert!(!manager.is_approved("file"));

        manager.revoke_session("shell");
        assert!(!manager.is_approved("shell"));
    }

    #[test]
    fn approve_once_does_not_mutate_state() {
        let manager = ApprovalManager::new(false);
        manager.set_level(ApprovalLevel::Session);
        manager.approve_once("shell");
        assert!(!manager.is_approved("shell"));
        assert!(manager.approved_tools().is_empty());
    }

    #[test]
    fn danger_flags_default_to_safe() {
        let manager = ApprovalManager::new(false);
        assert!(manager.is_dangerous("shell"));
        assert!(!manager.is_dangerous("file"));
        assert!(!manager.is_dangerous("never-heard-of-it"));

        manager.set_dangerous("custom", true);
        assert!(manager.is_dangerous("custom"));
        manager.set_dangerous("shell", false);
        assert!(!manager.is_dangerous("shell"));
    }

    #[test]
    fn approved_tools_and_clear() {
        let manager = ApprovalManager::new(false);
        manager.approve_for_session("file");
        manager.approve_for_session("shell");
        assert_eq!(manager.approved_tools(), vec!["file", "shell"]);

        manager.clear_session();
        assert!(manager.approved_tools().is_empty());
    }

    #[test]
    fn request_carries_the_danger_flag() {
        let manager = ApprovalManager::new(false);
        let request = manager.new_request("c1", "shell", r#"{"command":"rm -rf /"}"#);
        assert!(request.is_dangerous);
        assert!(request.to_string().contains("[DANGEROUS]"));

        let request = manager.new_request("c2", "file", "{}");
        assert!(!request.is_dangerous);
        assert!(!request.to_string().contains("[DANGEROUS]"));
    }

    #[test]
    fn level_display() {
        assert_eq!(ApprovalLevel::PerRequest.to_string(), "per-request");
        assert_eq!(ApprovalLevel::Session.to_string(), "session");
        assert_eq!(ApprovalLevel::AutoApproveAll.to_string(), "yolo");
    }
}
