//! Agent module: assistant CLI process management and event relay
//!
//! ## Architecture
//!
//! ```text
//! Browser ──HTTP──► handler ──► launcher ──stdin──► assistant CLI
//!    ▲                             │                    │
//!    │                             │ spawn / terminate  │ stdout (NDJSON)
//!    │                             ▼                    ▼
//!    └──────SSE────── relay ◄── session channel ◄── OutputParser
//! ```

pub mod handler;
pub mod input;
pub mod launcher;
pub mod relay;
pub mod session;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use handler::{agent_router, AgentState};
pub use input::encode_input;
pub use launcher::{AgentLauncher, TerminationOutcome};
pub use session::AgentSession;
pub use tracker::{RequestGuard, RequestTracker};
pub use types::{Continuation, InputMode, SessionInfo, SessionSignal, SpawnOptions};
