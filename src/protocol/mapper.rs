//! Raw CLI JSON → [`ProtocolEvent`] normalization
//!
//! The CLI's stream-json output is loosely typed and has changed shape across
//! releases, so each case accepts a current and a legacy `type` alias and
//! looks fields up defensively. Nothing outside this module sees the raw
//! `serde_json::Value`.

use crate::protocol::types::{ArtifactAction, ProtocolEvent, TodoItem, TodoStatus};
use serde_json::Value;

const THINKING_MARKER: &str = "[thinking]";

/// Map one parsed CLI line to a protocol event.
///
/// Returns `None` for intentionally skipped types (`system`/`init`), for
/// unknown types and for payloads missing a required field.
pub fn map_cli_event(raw: &Value) -> Option<ProtocolEvent> {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();

    match kind {
        "assistant" | "message" => map_assistant(raw),
        "result" | "complete" => Some(map_complete(raw)),
        "tool_use" | "tool_use_calls" => {
            let content = message_content(raw)?.as_array()?;
            find_tool_use(content)
        }
        "tool_result" | "tool_results" => Some(map_tool_result(raw)),
        "progress" | "todo" => map_progress(raw),
        "artifact" | "file" => map_artifact(raw),
        "system" | "init" => {
            tracing::trace!(kind, "Skipping CLI bookkeeping message");
            None
        }
        other => {
            tracing::debug!(kind = other, "Unknown CLI message type");
            None
        }
    }
}

/// `message.content`, falling back to a top-level `content`
fn message_content(raw: &Value) -> Option<&Value> {
    raw.get("message")
        .and_then(|m| m.get("content"))
        .or_else(|| raw.get("content"))
}

fn map_assistant(raw: &Value) -> Option<ProtocolEvent> {
    match message_content(raw)? {
        Value::String(text) => Some(ProtocolEvent::Message {
            content: text.clone(),
        }),
        Value::Array(blocks) => {
            // A tool call wins over any text in the same message
            if let Some(tool_use) = find_tool_use(blocks) {
                return Some(tool_use);
            }

            let parts: Vec<String> = blocks
                .iter()
                .filter_map(|block| match block_type(block) {
                    "text" => block.get("text").and_then(Value::as_str).map(str::to_string),
                    "thinking" => block
                        .get("thinking")
                        .or_else(|| block.get("text"))
                        .and_then(Value::as_str)
                        .map(|t| format!("{} {}", THINKING_MARKER, t)),
                    _ => None,
                })
                .collect();

            if parts.is_empty() {
                return None;
            }
            Some(ProtocolEvent::Message {
                content: parts.join("\n"),
            })
        }
        _ => None,
    }
}

fn block_type(block: &Value) -> &str {
    block.get("type").and_then(Value::as_str).unwrap_or_default()
}

fn find_tool_use(blocks: &[Value]) -> Option<ProtocolEvent> {
    let block = blocks.iter().find(|b| block_type(b) == "tool_use")?;
    let tool = block
        .get("name")
        .or_else(|| block.get("tool"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let input = block
        .get("input")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(ProtocolEvent::ToolUse { tool, input })
}

fn map_complete(raw: &Value) -> ProtocolEvent {
    let usage = raw.get("usage").filter(|u| u.is_object());
    let tokens = |field: &str| {
        usage
            .and_then(|u| u.get(field))
            .or_else(|| raw.get(field))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    ProtocolEvent::Complete {
        input_tokens: tokens("input_tokens"),
        output_tokens: tokens("output_tokens"),
    }
}

fn map_tool_result(raw: &Value) -> ProtocolEvent {
    let output = raw
        .get("output")
        .or_else(|| raw.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let cached = raw.get("cached").and_then(Value::as_bool);
    ProtocolEvent::ToolResult { output, cached }
}

fn map_progress(raw: &Value) -> Option<ProtocolEvent> {
    let todos = raw.get("todos")?.as_array()?;
    let todos = todos
        .iter()
        .map(|entry| TodoItem {
            content: str_field(entry, &["content"]),
            status: TodoStatus::coerce(entry.get("status").and_then(Value::as_str)),
            active_form: str_field(entry, &["activeForm", "active_form"]),
        })
        .collect();
    Some(ProtocolEvent::Progress { todos })
}

fn map_artifact(raw: &Value) -> Option<ProtocolEvent> {
    let path = ["path", "file_path"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str))?
        .to_string();
    Some(ProtocolEvent::Artifact {
        path,
        content: str_field(raw, &["content"]),
        action: ArtifactAction::coerce(raw.get("action").and_then(Value::as_str)),
    })
}

/// First string value among `keys`, or empty
fn str_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}
