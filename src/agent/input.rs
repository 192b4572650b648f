//! User message encoding for the CLI's stdin
//!
//! In streaming mode each message is a one-line JSON user envelope; in
//! per-message mode it is the raw text. Both are newline terminated.

use crate::agent::launcher::AgentLauncher;
use crate::agent::session::WriteOutcome;
use crate::agent::types::InputMode;
use bytes::Bytes;

/// Encode a user message for the given input mode
pub fn encode_input(mode: InputMode, text: &str) -> Bytes {
    let mut line = match mode {
        InputMode::Streaming => serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{ "type": "text", "text": text }],
            },
        })
        .to_string(),
        InputMode::PerMessage => text.to_string(),
    };
    line.push('\n');
    Bytes::from(line)
}

impl AgentLauncher {
    /// Write a user message to a session's CLI.
    ///
    /// Returns `false` if the session is unknown, its process has exited, its
    /// stdin is closed, or the write fails. A write queued above the high-water mark still succeeds.
    pub async fn send_message(&self, session_id: &str, text: &str) -> bool {
        let Some(session) = self.session(session_id).await else {
            tracing::warn!(session_id, "Cannot send message: unknown session");
            return false;
        };
        if !session.accepts_input().await {
            tracing::warn!(session_id, "Cannot send message: CLI stdin is closed");
            return false;
        }

        let input = session.input();
        match input.write(encode_input(session.input_mode, text)).await {
            Ok(WriteOutcome::Queued) => true,
            Ok(WriteOutcome::Backpressured) => {
                let pending = input.pending_bytes();
                tracing::debug!(session_id, pending, "CLI stdin backpressure, waiting for drain");
                let drained = input.drained();
                let session_id = session_id.to_string();
                tokio::spawn(async move {
                    if drained.await {
                        tracing::debug!(session_id = %session_id, "CLI stdin drained");
                    }
                });
                true
            }
            Err(e) => {
                tracing::warn!(session_id, "Failed to write message: {}", e);
                false
            }
        }
    }

    /// Close a session's stdin. Queued input is flushed first.
    pub async fn end_input(&self, session_id: &str) -> bool {
        let Some(session) = self.session(session_id).await else {
            tracing::warn!(session_id, "Cannot end input: unknown session");
            return false;
        };
        if !session.accepts_input().await {
            tracing::warn!(session_id, "Cannot end input: CLI stdin is already closed");
            return false;
        }
        session.input().close().await
    }

    pub async fn is_input_writable(&self, session_id: &str) -> bool {
        match self.session(session_id).await {
            Some(session) => session.accepts_input().await,
            None => false,
        }
    }

    pub async fn get_input_mode(&self, session_id: &str) -> Option<InputMode> {
        self.session(session_id).await.map(|s| s.input_mode)
    }

    /// Bytes accepted for a session's stdin but not yet flushed
    pub async fn pending_input_bytes(&self, session_id: &str) -> usize {
        self.session(session_id)
            .await
            .map(|s| s.input().pending_bytes())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{script_launcher, wait_for_event};
    use crate::agent::types::SpawnOptions;
    use std::time::Duration;

    #[test]
    fn test_encode_streaming_envelope() {
        let encoded = encode_input(InputMode::Streaming, "Hello \"world\"");
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["message"]["role"], "user");
        assert_eq!(value["message"]["content"][0]["type"], "text");
        assert_eq!(value["message"]["content"][0]["text"], "Hello \"world\"");
        assert_eq!(value["message"]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_encode_streaming_escapes_newlines() {
        let encoded = encode_input(InputMode::Streaming, "line one\nline two");
        let text = std::str::from_utf8(&encoded).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.contains("line one\\nline two"));
    }

    #[test]
    fn test_encode_per_message_raw_text() {
        let encoded = encode_input(InputMode::PerMessage, "List files");
        assert_eq!(&encoded[..], b"List files\n");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (launcher, _dir) = script_launcher("exit 0\n");
        assert!(!launcher.send_message("nonexistent", "hi").await);
        assert!(!launcher.end_input("nonexistent").await);
        assert!(!launcher.is_input_writable("nonexistent").await);
        assert_eq!(launcher.get_input_mode("nonexistent").await, None);
        assert_eq!(launcher.pending_input_bytes("nonexistent").await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streaming_message_reaches_stdin() {
        let (launcher, dir) = script_launcher(
            "read -r line\n\
             printf '%s\\n' \"$line\" > received.jsonl\n\
             printf '%s\\n' '{\"type\":\"tool_result\",\"output\":\"ok\"}'\n\
             read -r line\n",
        );
        launcher
            .spawn(dir.path(), Some("s1".to_string()), SpawnOptions::default())
            .await
            .unwrap();
        let mut rx = launcher.subscribe("s1").await.unwrap();
        assert_eq!(
            launcher.get_input_mode("s1").await,
            Some(InputMode::Streaming)
        );
        assert!(launcher.send_message("s1", "Hello").await);
        wait_for_event(&mut rx).await;

        let received = std::fs::read_to_string(dir.path().join("received.jsonl")).unwrap();
        let value: serde_json::Value = serde_json::from_str(received.trim_end()).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["message"]["content"][0]["text"], "Hello");
        launcher.terminate("s1").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_per_message_mode_writes_raw_text() {
        let (launcher, dir) = script_launcher(
            "read -r line\n\
             printf '%s\\n' \"$line\" > received.txt\n\
             printf '%s\\n' '{\"type\":\"tool_result\",\"output\":\"ok\"}'\n\
             read -r line\n",
        );
        let options = SpawnOptions {
            input_mode: Some(InputMode::PerMessage),
            ..Default::default()
        };
        launcher
            .spawn(dir.path(), Some("s1".to_string()), options)
            .await
            .unwrap();
        let mut rx = launcher.subscribe("s1").await.unwrap();
        assert!(launcher.send_message("s1", "List files").await);
        wait_for_event(&mut rx).await;

        let received = std::fs::read_to_string(dir.path().join("received.txt")).unwrap();
        assert_eq!(received, "List files\n");
        launcher.terminate("s1").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_end_input_closes_stdin() {
        // Exits only once stdin reaches EOF
        let (launcher, dir) = script_launcher("cat >/dev/null\nexit 0\n");
        launcher
            .spawn(dir.path(), Some("s1".to_string()), SpawnOptions::default())
            .await
            .unwrap();
        assert!(launcher.is_input_writable("s1").await);
        assert!(launcher.send_message("s1", "last words").await);

        assert!(launcher.end_input("s1").await);
        assert!(!launcher.is_input_writable("s1").await);
        assert!(!launcher.end_input("s1").await);
        assert!(!launcher.send_message("s1", "too late").await);

        let session = launcher.session("s1").await.unwrap();
        assert!(session.wait_for_exit(Duration::from_secs(5)).await);
        launcher.terminate("s1").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backpressure_still_succeeds() {
        let (launcher, dir) = script_launcher("sleep 0.3\ncat >/dev/null\n");
        launcher
            .spawn(dir.path(), Some("s1".to_string()), SpawnOptions::default())
            .await
            .unwrap();

        let big = "x".repeat(200 * 1024);
        assert!(launcher.send_message("s1", &big).await);
        assert!(launcher.pending_input_bytes("s1").await > 0);

        let session = launcher.session("s1").await.unwrap();
        let drained = session.input().drained();
        assert!(tokio::time::timeout(Duration::from_secs(5), drained)
            .await
            .unwrap());
        assert_eq!(launcher.pending_input_bytes("s1").await, 0);
        launcher.terminate("s1").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_after_exit_fails() {
        let (launcher, dir) = script_launcher("exit 0\n");
        launcher
            .spawn(dir.path(), Some("s1".to_string()), SpawnOptions::default())
            .await
            .unwrap();
        let session = launcher.session("s1").await.unwrap();
        assert!(session.wait_for_exit(Duration::from_secs(5)).await);

        assert!(!launcher.is_input_writable("s1").await);
        assert!(!launcher.send_message("s1", "hello?").await);
        assert!(!launcher.end_input("s1").await);
        assert_eq!(launcher.pending_input_bytes("s1").await, 0);
        launcher.terminate("s1").await;
    }
}
