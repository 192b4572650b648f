//! Gateway server for RelayChat
//!
//! Binds the HTTP listener, serves the API and coordinates graceful
//! shutdown: drain in-flight streams, then terminate every CLI process.

mod server;

pub use server::{Gateway, GatewayState, GatewayStatus};
