//! RelayChat - local browser front end for an assistant CLI
//!
//! RelayChat runs the assistant CLI as a child process in non-interactive
//! stream-json mode and bridges it to a browser over HTTP: user messages go
//! to the CLI's stdin, and its newline-delimited JSON output is normalized
//! into a small set of protocol events and pushed to the page as
//! server-sent events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐  POST /api/message   ┌──────────────────────────────────────┐
//! │         │ ───────────────────► │ agent::handler                        │
//! │ Browser │                      │   │                                   │
//! │         │  GET /api/stream/:id │   ▼                                   │
//! │         │ ◄─────────────────── │ agent::launcher ──► encode_input ──┐  │
//! └─────────┘   data: {event}      │   ▲                                │  │
//!                                  │   │ SessionSignal                  ▼  │
//!                                  │ agent::relay ◄── OutputParser ◄── CLI │
//!                                  └──────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: line reassembly, raw event mapping and the event union
//! - [`agent`]: process lifecycle, stdin encoding, SSE relay and handlers
//! - [`gateway`]: HTTP server and graceful shutdown
//! - [`api`]: router assembly
//! - [`config`]: configuration management

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;

pub use config::RelayConfig;
pub use error::{Error, ErrorCode, Result};
