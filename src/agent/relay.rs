//! Event relay from a session's channel to HTTP clients
//!
//! [`session_events`] turns the broadcast channel into a typed stream that
//! ends after the first terminal event. The SSE endpoint wraps it with an
//! initial comment and heartbeats; [`collect_until_complete`] buffers it for
//! clients that cannot consume a stream.

use crate::agent::launcher::AgentLauncher;
use crate::agent::session::AgentSession;
use crate::agent::tracker::RequestGuard;
use crate::agent::types::SessionSignal;
use crate::error::{Error, ErrorCode, Result};
use crate::protocol::ProtocolEvent;
use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Stream a session's protocol events until a `complete` or `error` event.
///
/// If the process exits without producing one, a `CLI_EXIT` error closes the
/// stream so the client always sees a terminal event.
pub fn session_events(session: &AgentSession) -> impl Stream<Item = ProtocolEvent> + Send + 'static {
    let mut rx = session.subscribe();
    let exited = session.exit_info();
    let session_id = session.id.clone();

    stream! {
        if let Some(exit) = exited {
            yield exit_event(exit.code, exit.signal);
            return;
        }

        loop {
            match rx.recv().await {
                Ok(SessionSignal::Event(event)) => {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
                Ok(SessionSignal::Error { .. }) => {}
                Ok(SessionSignal::Exit { code, signal }) => {
                    yield exit_event(code, signal);
                    break;
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(session_id = %session_id, skipped = n, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

fn exit_event(code: Option<i32>, signal: Option<i32>) -> ProtocolEvent {
    let message = match (code, signal) {
        (Some(code), _) => format!("CLI exited with code {}", code),
        (None, Some(signal)) => format!("CLI was terminated by signal {}", signal),
        (None, None) => "CLI process exited".to_string(),
    };
    ProtocolEvent::error(ErrorCode::CliExit, message)
}

/// SSE response for a session.
///
/// An empty comment is sent first so headers reach the client before any
/// event exists. `guard` is released when the stream ends or the client
/// disconnects.
pub fn sse_response(
    session: &AgentSession,
    heartbeat: Duration,
    guard: RequestGuard,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = session_events(session);
    let session_id = session.id.clone();

    let stream = stream! {
        let _guard = guard;
        yield Ok(Event::default().comment(""));

        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match Event::default().json_data(&event) {
                Ok(frame) => yield Ok(frame),
                Err(e) => {
                    tracing::error!(session_id = %session_id, "Failed to serialize event: {}", e);
                }
            }
        }
        tracing::debug!(session_id = %session_id, "SSE stream ended");
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat"))
}

/// Send a message and buffer the resulting events up to the terminal one.
///
/// Fails with [`Error::Timeout`] if no terminal event arrives in time.
pub async fn collect_until_complete(
    launcher: &AgentLauncher,
    session_id: &str,
    text: &str,
    timeout: Duration,
) -> Result<Vec<ProtocolEvent>> {
    let session = launcher
        .session(session_id)
        .await
        .ok_or_else(|| Error::Session(format!("Session not found: {}", session_id)))?;

    // Subscribe before sending so no early event is missed
    let events = session_events(&session);
    if !launcher.send_message(session_id, text).await {
        return Err(Error::Session(format!(
            "Failed to send message to session {}",
            session_id
        )));
    }

    tokio::time::timeout(timeout, events.collect::<Vec<_>>())
        .await
        .map_err(|_| {
            tracing::warn!(session_id, timeout_secs = timeout.as_secs(), "Collect request timed out");
            Error::Timeout(format!(
                "No complete event from session {} within {:?}",
                session_id, timeout
            ))
        })
}
