//! CLI output protocol: line reassembly, normalization and the event union
//!
//! ```text
//! stdout chunks ──► OutputParser (per-session line buffer)
//!                       │ complete lines
//!                       ▼
//!                   map_cli_event (raw JSON → ProtocolEvent)
//!                       │ validated events
//!                       ▼
//!                   session event channel
//! ```

pub mod mapper;
pub mod parser;
pub mod types;

pub use mapper::map_cli_event;
pub use parser::OutputParser;
pub use types::{ArtifactAction, ProtocolEvent, TodoItem, TodoStatus};
