//! Per-session line reassembly for the CLI's stdout
//!
//! Output arrives in arbitrary chunks. Each session keeps the trailing
//! incomplete line between calls; only newline-terminated lines are parsed.
//! The partial line is held as raw bytes so a multi-byte character split
//! across two chunks is decoded only once it is whole.

use crate::protocol::mapper::map_cli_event;
use crate::protocol::types::ProtocolEvent;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Characters of an unparseable line included in the log entry
const PREVIEW_CHARS: usize = 100;

/// Line buffers keyed by session id
#[derive(Debug, Default)]
pub struct OutputParser {
    buffers: Mutex<HashMap<String, Vec<u8>>>,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stdout chunk and return the events of every line it completes,
    /// in the order the lines appeared.
    pub async fn parse_output_chunk(&self, session_id: &str, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let complete = {
            let mut buffers = self.buffers.lock().await;
            let pending = buffers.entry(session_id.to_string()).or_default();
            pending.extend_from_slice(chunk);

            let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') else {
                return Vec::new();
            };
            let remainder = pending.split_off(last_newline + 1);
            let mut complete = std::mem::replace(pending, remainder);
            complete.truncate(last_newline);
            complete
        };

        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| parse_line(session_id, &String::from_utf8_lossy(line)))
            .collect()
    }

    /// Current partial line for a session (empty if none)
    pub async fn buffer(&self, session_id: &str) -> String {
        self.buffers
            .lock()
            .await
            .get(session_id)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Drop a session's partial line. Safe to call repeatedly.
    pub async fn clear_buffer(&self, session_id: &str) {
        self.buffers.lock().await.remove(session_id);
    }
}

fn parse_line(session_id: &str, line: &str) -> Option<ProtocolEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let raw: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            let preview: String = line.chars().take(PREVIEW_CHARS).collect();
            tracing::warn!(
                session_id,
                "Dropping unparseable CLI output: {} (line: {})",
                e,
                preview
            );
            return None;
        }
    };

    let event = map_cli_event(&raw)?;
    if let Err(e) = event.validate() {
        tracing::warn!(session_id, kind = event.kind(), "Dropping invalid event: {}", e);
        return None;
    }
    Some(event)
}
