//! Conversation transcript types
//!
//! Defines the message shapes exchanged with the model and the
//! [`ContextWindow`] that owns the transcript and keeps it inside the
//! model's context budget.

mod window;

pub use window::{estimate_message_tokens, CompactionReport, ContextWindow};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
///
/// `arguments` is always a JSON value: provider argument text that fails to
/// parse is preserved as `{"raw": "<text>"}` so the model can see and repair
/// its own malformed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Loop iteration this call was issued in. Zero until the loop stamps
    /// it; providers know nothing about turns.
    #[serde(default)]
    pub turn: u32,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            turn: 0,
        }
    }
}

/// A single message in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Reasoning text extracted from the provider response. Kept for the
    /// record; never sent back to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `Role::Tool` messages, the id of the call this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            thinking: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thinking: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            thinking: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// An assistant turn that requests tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            thinking: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// A tool result, tagged with the call id it answers.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            thinking: None,
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }

    /// Whether this assistant turn carries tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_constructors() {
        let sys = Message::system("rules");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content, "rules");

        let user = Message::user("do the thing");
        assert_eq!(user.role, Role::User);

        let asst = Message::assistant("working on it");
        assert_eq!(asst.role, Role::Assistant);
        assert!(!asst.has_tool_calls());

        let result = Message::tool_result("call_1", "ok");
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_assistant_with_tools() {
        let call = ToolCall::new("call_1", "shell", json!({"command": "ls"}));
        let msg = Message::assistant_with_tools("", vec![call]);
        assert!(msg.has_tool_calls());
        let calls = msg.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].name, "shell");
        assert_eq!(calls[0].arguments["command"], "ls");
    }

    #[test]
    fn test_tool_call_turn_defaults_to_zero() {
        let call = ToolCall::new("c1", "shell", json!({}));
        assert_eq!(call.turn, 0);

        // Wire responses never carry a turn; deserialization must not
        // require one.
        let parsed: ToolCall =
            serde_json::from_str(r#"{"id": "c2", "name": "shell", "arguments": {}}"#).unwrap();
        assert_eq!(parsed.turn, 0);
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("thinking"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn test_with_thinking() {
        let msg = Message::assistant("answer").with_thinking("step by step");
        assert_eq!(msg.thinking.as_deref(), Some("step by step"));
    }
}
