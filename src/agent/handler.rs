//! HTTP handlers for the browser-facing agent API
//!
//! The UI works against a single "current" session. It obtains the id from
//! `GET /api/session`, opens `GET /api/stream/:id` for events and posts
//! messages to `POST /api/message`. All handlers delegate to
//! [`AgentLauncher`].

use crate::agent::launcher::AgentLauncher;
use crate::agent::relay;
use crate::agent::tracker::RequestTracker;
use crate::agent::types::{Continuation, SessionInfo, SpawnOptions};
use crate::error::{Error, ErrorCode};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// Upper bound on tool allow-list entries for a resumed session
pub const MAX_ALLOWED_TOOLS: usize = 32;

const TOOL_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_:*().\-]{0,63}$";
const RESUME_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_\-]{0,127}$";

/// Shared state for agent handlers
#[derive(Clone)]
pub struct AgentState {
    pub launcher: Arc<AgentLauncher>,
    /// Id of the session the UI is attached to
    pub current: Arc<RwLock<Option<String>>>,
    pub tracker: RequestTracker,
    /// Working directory for new sessions
    pub project_dir: PathBuf,
}

impl AgentState {
    pub fn new(launcher: Arc<AgentLauncher>, project_dir: PathBuf) -> Self {
        Self {
            launcher,
            current: Arc::new(RwLock::new(None)),
            tracker: RequestTracker::new(),
            project_dir,
        }
    }

    /// Whether `session_id` is the current session
    async fn is_current(&self, session_id: &str) -> bool {
        self.current.read().await.as_deref() == Some(session_id)
    }
}

/// Create the agent router
pub fn agent_router(state: AgentState) -> Router {
    Router::new()
        .route("/api/session", get(current_session))
        .route("/api/session/reset", post(reset_session))
        .route("/api/session/:id", delete(delete_session))
        .route("/api/message", post(send_message))
        .route("/api/stream/:id", get(stream_events))
        .route("/api/chat", post(chat))
        .with_state(state)
}

// =============================================================================
// Validation
// =============================================================================

fn compiled(cell: &'static OnceLock<Result<Regex, regex::Error>>, pattern: &str) -> crate::Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| Error::Internal(format!("Invalid pattern {}: {}", pattern, e)))
}

/// Reject allow-lists that are too long or contain anything but tool tokens
pub fn validate_allowed_tools(tools: &[String]) -> crate::Result<()> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let re = compiled(&RE, TOOL_PATTERN)?;

    if tools.len() > MAX_ALLOWED_TOOLS {
        return Err(Error::Validation(format!(
            "At most {} allowed tools may be given",
            MAX_ALLOWED_TOOLS
        )));
    }
    if let Some(bad) = tools.iter().find(|t| !re.is_match(t)) {
        return Err(Error::Validation(format!("Invalid tool name: {:?}", bad)));
    }
    Ok(())
}

pub fn validate_resume_id(id: &str) -> crate::Result<()> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    if compiled(&RE, RESUME_ID_PATTERN)?.is_match(id) {
        Ok(())
    } else {
        Err(Error::Validation(format!("Invalid resume session id: {:?}", id)))
    }
}

fn error_response(err: &Error) -> (StatusCode, Json<Value>) {
    let (status, code) = match err {
        Error::Validation(_) => (StatusCode::BAD_REQUEST, None),
        Error::Session(_) => (StatusCode::NOT_FOUND, None),
        Error::CliNotFound(_) => (StatusCode::SERVICE_UNAVAILABLE, Some(ErrorCode::CliNotFound)),
        Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, None),
        Error::Spawn { code, .. } => (StatusCode::INTERNAL_SERVER_ERROR, Some(*code)),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };
    let mut body = json!({ "error": err.to_string() });
    if let Some(code) = code {
        body["code"] = json!(code);
    }
    (status, Json(body))
}

fn not_found(session_id: &str) -> (StatusCode, Json<Value>) {
    error_response(&Error::Session(format!("Session not found: {}", session_id)))
}

fn session_json(info: &SessionInfo) -> Json<Value> {
    Json(json!({
        "sessionId": info.session_id,
        "inputMode": info.input_mode,
        "createdAt": info.created_at,
        "cwd": info.cwd,
    }))
}

// =============================================================================
// Session handlers
// =============================================================================

/// Return the current session, spawning one if there is none
async fn current_session(State(state): State<AgentState>) -> impl IntoResponse {
    // Held across terminate and spawn so concurrent callers share one replacement
    let mut current = state.current.write().await;

    if let Some(id) = current.clone() {
        match state.launcher.get_session(&id).await {
            Some(info) if info.alive => return (StatusCode::OK, session_json(&info)),
            Some(_) => {
                tracing::info!(session_id = %id, "Current session has exited, replacing it");
                state.launcher.terminate(&id).await;
            }
            None => {}
        }
        *current = None;
    }

    match state
        .launcher
        .spawn(&state.project_dir, None, SpawnOptions::default())
        .await
    {
        Ok(info) => {
            *current = Some(info.session_id.clone());
            (StatusCode::OK, session_json(&info))
        }
        Err(e) => error_response(&e),
    }
}

/// Reset session request body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetSessionRequest {
    #[serde(default)]
    continue_conversation: bool,
    resume_session_id: Option<String>,
    allowed_tools: Option<Vec<String>>,
}

impl ResetSessionRequest {
    fn continuation(self) -> crate::Result<Continuation> {
        match (self.resume_session_id, self.continue_conversation) {
            (Some(_), true) => Err(Error::Validation(
                "continueConversation and resumeSessionId are mutually exclusive".to_string(),
            )),
            (Some(conversation_id), false) => {
                validate_resume_id(&conversation_id)?;
                let allowed_tools = self.allowed_tools.unwrap_or_default();
                validate_allowed_tools(&allowed_tools)?;
                Ok(Continuation::Resume {
                    conversation_id,
                    allowed_tools,
                })
            }
            (None, _) if self.allowed_tools.is_some() => Err(Error::Validation(
                "allowedTools requires resumeSessionId".to_string(),
            )),
            (None, true) => Ok(Continuation::ContinueLatest),
            (None, false) => Ok(Continuation::Fresh),
        }
    }
}

/// Terminate the current session and start a new one
async fn reset_session(
    State(state): State<AgentState>,
    Json(request): Json<ResetSessionRequest>,
) -> impl IntoResponse {
    let continuation = match request.continuation() {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    // Held across terminate and spawn so resets are serialized
    let mut current = state.current.write().await;
    if let Some(old) = current.take() {
        state.launcher.terminate(&old).await;
    }

    let options = SpawnOptions {
        continuation,
        ..Default::default()
    };
    match state.launcher.spawn(&state.project_dir, None, options).await {
        Ok(info) => {
            *current = Some(info.session_id.clone());
            (StatusCode::OK, session_json(&info))
        }
        Err(e) => error_response(&e),
    }
}

/// Terminate a session explicitly
async fn delete_session(
    State(state): State<AgentState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let mut current = state.current.write().await;
    if !state.launcher.terminate(&id).await {
        return not_found(&id).into_response();
    }
    if current.as_deref() == Some(id.as_str()) {
        *current = None;
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Messaging handlers
// =============================================================================

/// Message request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest {
    session_id: String,
    message: String,
}

impl MessageRequest {
    async fn check(&self, state: &AgentState) -> Result<(), (StatusCode, Json<Value>)> {
        if !state.is_current(&self.session_id).await {
            return Err(not_found(&self.session_id));
        }
        if self.message.trim().is_empty() {
            return Err(error_response(&Error::Validation(
                "Message must not be empty".to_string(),
            )));
        }
        Ok(())
    }
}

/// Write a message to the session's CLI; events arrive on the stream
async fn send_message(
    State(state): State<AgentState>,
    Json(request): Json<MessageRequest>,
) -> impl IntoResponse {
    if let Err(rejection) = request.check(&state).await {
        return rejection;
    }

    if state
        .launcher
        .send_message(&request.session_id, &request.message)
        .await
    {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": "Failed to send message" })),
        )
    }
}

/// Send a message and answer with every event up to the terminal one
async fn chat(
    State(state): State<AgentState>,
    Json(request): Json<MessageRequest>,
) -> impl IntoResponse {
    if let Err(rejection) = request.check(&state).await {
        return rejection;
    }

    let _guard = state.tracker.begin();
    let timeout = state.launcher.relay_settings().collect_timeout();
    match relay::collect_until_complete(
        &state.launcher,
        &request.session_id,
        &request.message,
        timeout,
    )
    .await
    {
        Ok(events) => (StatusCode::OK, Json(json!({ "events": events }))),
        Err(e) => error_response(&e),
    }
}

/// SSE stream of the session's protocol events
async fn stream_events(State(state): State<AgentState>, Path(id): Path<String>) -> Response {
    if !state.is_current(&id).await {
        return not_found(&id).into_response();
    }
    let Some(session) = state.launcher.session(&id).await else {
        return not_found(&id).into_response();
    };

    tracing::debug!(session_id = %id, "SSE client connected");
    let heartbeat = state.launcher.relay_settings().heartbeat_interval();
    relay::sse_response(&session, heartbeat, state.tracker.begin()).into_response()
}
