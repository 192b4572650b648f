//! Session types shared by the launcher, the input encoder and the relay

use crate::error::ErrorCode;
use crate::protocol::ProtocolEvent;
use serde::{Deserialize, Serialize};

/// How user messages are written to the CLI's stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputMode {
    /// One JSON user envelope per line (`--input-format stream-json`)
    #[default]
    Streaming,
    /// Raw text per line
    PerMessage,
}

/// Which conversation the CLI should pick up
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Start a new conversation
    #[default]
    Fresh,
    /// `--continue`: the most recent conversation in the working directory
    ContinueLatest,
    /// `--resume <id>`, optionally pre-authorizing tools for the resumed run
    Resume {
        conversation_id: String,
        allowed_tools: Vec<String>,
    },
}

/// Options for [`AgentLauncher::spawn`](crate::agent::AgentLauncher::spawn)
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub continuation: Continuation,
    /// Overrides the configured input mode
    pub input_mode: Option<InputMode>,
}

/// Snapshot of a registered session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub pid: Option<u32>,
    pub cwd: String,
    pub input_mode: InputMode,
    pub created_at: i64,
    pub alive: bool,
}

/// How the child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn from_status(status: &std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }

    /// Non-zero, non-null exit codes are reported to the browser
    pub fn is_failure(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }
}

/// Everything published on a session's event channel
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    /// Browser-facing protocol event
    Event(ProtocolEvent),
    /// Process-level fault, for internal listeners
    Error { code: ErrorCode, message: String },
    /// The child process exited
    Exit { code: Option<i32>, signal: Option<i32> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&InputMode::Streaming).unwrap(),
            "\"streaming\""
        );
        assert_eq!(
            serde_json::to_string(&InputMode::PerMessage).unwrap(),
            "\"per-message\""
        );
        let mode: InputMode = serde_json::from_str("\"per-message\"").unwrap();
        assert_eq!(mode, InputMode::PerMessage);
    }

    #[test]
    fn test_exit_failure_rules() {
        let clean = ExitInfo {
            code: Some(0),
            signal: None,
        };
        let failed = ExitInfo {
            code: Some(2),
            signal: None,
        };
        let killed = ExitInfo {
            code: None,
            signal: Some(9),
        };
        assert!(!clean.is_failure());
        assert!(failed.is_failure());
        assert!(!killed.is_failure());
    }

    #[test]
    fn test_session_info_serializes_camel_case() {
        let info = SessionInfo {
            session_id: "s1".to_string(),
            pid: Some(42),
            cwd: "/tmp".to_string(),
            input_mode: InputMode::Streaming,
            created_at: 1_700_000_000_000,
            alive: true,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["inputMode"], "streaming");
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
    }
}
