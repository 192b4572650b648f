//! Protocol events relayed from the CLI to the browser
//!
//! Every line the CLI writes is normalized into exactly one of the
//! [`ProtocolEvent`] variants (or dropped). The browser only ever sees these
//! shapes, serialized as `{"type": "<tag>", ...}`.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};

/// Tagged union of everything the browser can receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Incremental assistant text
    Message { content: String },
    /// Tool invocation requested by the assistant
    ToolUse {
        tool: String,
        input: serde_json::Value,
    },
    /// Output of a tool invocation
    ToolResult {
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cached: Option<bool>,
    },
    /// Task list update
    Progress { todos: Vec<TodoItem> },
    /// File created or updated by the assistant
    Artifact {
        path: String,
        content: String,
        action: ArtifactAction,
    },
    /// Turn finished
    Complete {
        input_tokens: u64,
        output_tokens: u64,
    },
    /// Process or transport fault
    Error { message: String, code: ErrorCode },
}

/// One entry of a `progress` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
    #[serde(rename = "activeForm")]
    pub active_form: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    /// Coerce a loosely-typed status; anything unrecognized is `Pending`
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw {
            Some("in_progress") => Self::InProgress,
            Some("completed") => Self::Completed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactAction {
    Create,
    #[default]
    Update,
}

impl ArtifactAction {
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw {
            Some("create") => Self::Create,
            _ => Self::Update,
        }
    }
}

/// Reason an event failed structural validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ProtocolEvent {
    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Progress { .. } => "progress",
            Self::Artifact { .. } => "artifact",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end an SSE stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Build an `error` event
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }

    /// Check the invariants the type system does not enforce
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::ToolUse { tool, input } => {
                if tool.trim().is_empty() {
                    return Err(ValidationError("tool_use without a tool name".into()));
                }
                if !(input.is_object() || input.is_null()) {
                    return Err(ValidationError(format!(
                        "tool_use input for {} is not an object",
                        tool
                    )));
                }
            }
            Self::Artifact { path, .. } => {
                if path.trim().is_empty() {
                    return Err(ValidationError("artifact with an empty path".into()));
                }
            }
            Self::Error { message, .. } => {
                if message.is_empty() {
                    return Err(ValidationError("error without a message".into()));
                }
            }
            Self::Message { .. }
            | Self::ToolResult { .. }
            | Self::Progress { .. }
            | Self::Complete { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape() {
        let event = ProtocolEvent::Message {
            content: "Hi there".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"type": "message", "content": "Hi there"}));
    }

    #[test]
    fn test_complete_wire_shape() {
        let event = ProtocolEvent::Complete {
            input_tokens: 5,
            output_tokens: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["input_tokens"], 5);
        assert_eq!(json["output_tokens"], 3);
    }

    #[test]
    fn test_tool_result_omits_absent_cache_flag() {
        let event = ProtocolEvent::ToolResult {
            output: "ok".to_string(),
            cached: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("cached"));
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = ProtocolEvent::error(ErrorCode::CliExit, "CLI exited with code 2");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "CLI_EXIT");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_todo_item_uses_active_form_key() {
        let item = TodoItem {
            content: "Write tests".to_string(),
            status: TodoStatus::InProgress,
            active_form: "Writing tests".to_string(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["activeForm"], "Writing tests");
    }

    #[test]
    fn test_status_coercion() {
        assert_eq!(TodoStatus::coerce(Some("completed")), TodoStatus::Completed);
        assert_eq!(TodoStatus::coerce(Some("in_progress")), TodoStatus::InProgress);
        assert_eq!(TodoStatus::coerce(Some("blocked")), TodoStatus::Pending);
        assert_eq!(TodoStatus::coerce(None), TodoStatus::Pending);
        assert_eq!(ArtifactAction::coerce(Some("create")), ArtifactAction::Create);
        assert_eq!(ArtifactAction::coerce(Some("delete")), ArtifactAction::Update);
    }

    #[test]
    fn test_validate_rejects_empty_tool_name() {
        let event = ProtocolEvent::ToolUse {
            tool: " ".to_string(),
            input: serde_json::json!({}),
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_object_tool_input() {
        let event = ProtocolEvent::ToolUse {
            tool: "Bash".to_string(),
            input: serde_json::json!("ls"),
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_artifact_path() {
        let event = ProtocolEvent::Artifact {
            path: String::new(),
            content: "x".to_string(),
            action: ArtifactAction::Create,
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_terminal_kinds() {
        let message = ProtocolEvent::Message {
            content: String::new(),
        };
        assert!(!message.is_terminal());
        assert_eq!(message.kind(), "message");
        let complete = ProtocolEvent::Complete {
            input_tokens: 0,
            output_tokens: 0,
        };
        assert!(complete.is_terminal());
    }
}
