//! CLI process lifecycle management
//!
//! Spawns the assistant CLI in non-interactive stream-json mode, wires its
//! stdout through the [`OutputParser`] onto the session's event channel, and
//! stops it with a graceful-then-forced two-phase termination.
//!
//! Sessions stay registered until [`AgentLauncher::terminate`] is called, even
//! if the process exits on its own. The caller that started a session is the
//! one that cleans it up.

use crate::agent::session::{AgentSession, InputChannel, ProcessControl};
use crate::agent::types::{
    Continuation, ExitInfo, InputMode, SessionInfo, SessionSignal, SpawnOptions,
};
use crate::config::{CliConfig, RelaySettings};
use crate::error::{Error, ErrorCode, Result};
use crate::protocol::{OutputParser, ProtocolEvent};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead};

const DEFAULT_BINARY: &str = "claude";

/// How long output may stay open after the process has exited
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// How a process was stopped by [`AgentLauncher::shutdown_process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// It had already exited
    AlreadyExited,
    /// It exited within the grace period after SIGTERM
    Graceful,
    /// SIGKILL was sent after the grace period elapsed
    Forced,
}

/// Manages CLI process lifecycles
pub struct AgentLauncher {
    /// Live sessions keyed by session id
    sessions: Arc<RwLock<HashMap<String, Arc<AgentSession>>>>,
    /// Per-session stdout line buffers
    parser: Arc<OutputParser>,
    cli: CliConfig,
    relay: RelaySettings,
}

impl AgentLauncher {
    /// Create a new launcher with an empty registry
    pub fn new(cli: CliConfig, relay: RelaySettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            parser: Arc::new(OutputParser::new()),
            cli,
            relay,
        }
    }

    pub fn relay_settings(&self) -> &RelaySettings {
        &self.relay
    }

    pub fn parser(&self) -> &OutputParser {
        &self.parser
    }

    /// Spawn a CLI process for a session and register it.
    ///
    /// Fails with [`Error::CliNotFound`] before anything is spawned if the
    /// executable cannot be resolved.
    pub async fn spawn(
        &self,
        project_path: &Path,
        session_id: Option<String>,
        options: SpawnOptions,
    ) -> Result<SessionInfo> {
        let binary = resolve_cli_binary(&self.cli)?;
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let input_mode = options.input_mode.unwrap_or(self.cli.input_mode);
        let args = build_cli_args(&self.cli, input_mode, &options.continuation);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(Error::Session(format!(
                "Session already exists: {}",
                session_id
            )));
        }

        tracing::info!(
            session_id = %session_id,
            binary = %binary.display(),
            cwd = %project_path.display(),
            continuation = ?options.continuation,
            "Spawning assistant CLI"
        );

        let mut child = Command::new(&binary)
            .args(&args)
            .current_dir(project_path)
            .envs(&self.cli.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let code = ErrorCode::from_spawn_error(&e);
                tracing::error!(
                    session_id = %session_id,
                    code = %code,
                    "Failed to spawn {}: {}",
                    binary.display(),
                    e
                );
                Error::Spawn {
                    code,
                    message: format!("Failed to spawn {}: {}", binary.display(), e),
                }
            })?;

        let pid = child.id();
        let (events_tx, _) = broadcast::channel(self.relay.event_capacity.max(1));
        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let input = match child.stdin.take() {
            Some(stdin) => {
                InputChannel::spawn(session_id.clone(), stdin, self.relay.input_high_water_mark)
            }
            None => InputChannel::detached(),
        };
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_stdout(
                session_id.clone(),
                stdout,
                self.parser.clone(),
                events_tx.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_stderr(
                session_id.clone(),
                stderr,
                events_tx.clone(),
            )));
        }
        tokio::spawn(monitor_process(
            session_id.clone(),
            child,
            pumps,
            control_rx,
            exit_tx,
            events_tx.clone(),
        ));

        let session = Arc::new(AgentSession::new(
            session_id.clone(),
            project_path.to_path_buf(),
            input_mode,
            pid,
            events_tx,
            exit_rx,
            control_tx,
            input,
        ));
        let info = session.info();
        sessions.insert(session_id, session);

        Ok(info)
    }

    /// Stop a session's process and remove it from the registry.
    ///
    /// Returns `false` if the session is unknown.
    pub async fn terminate(&self, session_id: &str) -> bool {
        let Some(session) = self.session(session_id).await else {
            return false;
        };

        self.parser.clear_buffer(session_id).await;
        let outcome = self.shutdown_process(&session).await;
        self.sessions.write().await.remove(session_id);

        tracing::info!(session_id, outcome = ?outcome, "Session terminated");
        true
    }

    /// Terminate every registered session concurrently
    pub async fn terminate_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }
        tracing::info!(count = ids.len(), "Terminating all sessions");
        futures::future::join_all(ids.iter().map(|id| self.terminate(id))).await;
    }

    /// SIGTERM, wait up to the grace period for the exit, then SIGKILL
    pub async fn shutdown_process(&self, session: &AgentSession) -> TerminationOutcome {
        if !session.is_alive() {
            return TerminationOutcome::AlreadyExited;
        }

        session.control(ProcessControl::Terminate);
        if session.wait_for_exit(self.relay.terminate_grace()).await {
            return TerminationOutcome::Graceful;
        }

        tracing::warn!(
            session_id = %session.id,
            grace_ms = self.relay.terminate_grace_ms,
            "CLI ignored SIGTERM, force killing"
        );
        session.control(ProcessControl::Kill);
        TerminationOutcome::Forced
    }

    pub(crate) async fn session(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Get info for a session
    pub async fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        self.session(session_id).await.map(|s| s.info())
    }

    /// Get all sessions
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect()
    }

    /// Whether the session's process is still running
    pub async fn is_alive(&self, session_id: &str) -> bool {
        self.session(session_id)
            .await
            .map(|s| s.is_alive())
            .unwrap_or(false)
    }

    /// Subscribe to a session's event channel
    pub async fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<SessionSignal>> {
        self.session(session_id).await.map(|s| s.subscribe())
    }
}

/// Build the CLI argument list for a session
pub fn build_cli_args(
    cli: &CliConfig,
    input_mode: InputMode,
    continuation: &Continuation,
) -> Vec<String> {
    let mut args = cli.leading_args.clone();
    args.extend(
        ["--print", "--output-format", "stream-json", "--verbose"]
            .iter()
            .map(|s| s.to_string()),
    );
    if input_mode == InputMode::Streaming {
        args.push("--input-format".to_string());
        args.push("stream-json".to_string());
    }

    match continuation {
        Continuation::Fresh => {}
        Continuation::ContinueLatest => args.push("--continue".to_string()),
        Continuation::Resume {
            conversation_id,
            allowed_tools,
        } => {
            args.push("--resume".to_string());
            args.push(conversation_id.clone());
            if !allowed_tools.is_empty() {
                args.push("--allowedTools".to_string());
                args.push(allowed_tools.join(","));
            }
        }
    }

    args
}

/// Resolve the CLI executable, or fail with `CliNotFound`
pub fn resolve_cli_binary(cli: &CliConfig) -> Result<PathBuf> {
    let configured = cli.binary.as_deref();
    let name = configured.unwrap_or_else(|| Path::new(DEFAULT_BINARY));

    if name.components().count() > 1 || name.is_absolute() {
        if name.is_file() {
            return Ok(name.to_path_buf());
        }
        return Err(Error::CliNotFound(format!(
            "{} does not exist",
            name.display()
        )));
    }

    if let Some(found) = search_path(name) {
        return Ok(found);
    }

    if configured.is_none() {
        let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let candidates = [
            home.join(".claude").join("local").join("claude"),
            PathBuf::from("/usr/local/bin/claude"),
            PathBuf::from("/opt/homebrew/bin/claude"),
        ];
        if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
            return Ok(found);
        }
    }

    Err(Error::CliNotFound(format!(
        "{} is not on PATH. Install the assistant CLI or set cli.binary",
        name.display()
    )))
}

fn search_path(name: &Path) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Stream stdout through the parser onto the event channel
async fn pump_stdout(
    session_id: String,
    stdout: ChildStdout,
    parser: Arc<OutputParser>,
    events: broadcast::Sender<SessionSignal>,
) {
    let mut chunks = FramedRead::new(stdout, BytesCodec::new());
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(bytes) => {
                for event in parser.parse_output_chunk(&session_id, &bytes).await {
                    let _ = events.send(SessionSignal::Event(event));
                }
            }
            Err(e) => {
                let message = format!("Failed to read CLI output: {}", e);
                tracing::error!(session_id = %session_id, "{}", message);
                let _ = events.send(SessionSignal::Event(ProtocolEvent::error(
                    ErrorCode::CliIoError,
                    message.clone(),
                )));
                let _ = events.send(SessionSignal::Error {
                    code: ErrorCode::CliIoError,
                    message,
                });
                break;
            }
        }
    }
    tracing::debug!(session_id = %session_id, "CLI stdout closed");
}

/// Forward stderr diagnostics to the log and the browser
async fn pump_stderr<R: AsyncRead + Unpin>(
    session_id: String,
    stderr: R,
    events: broadcast::Sender<SessionSignal>,
) {
    let mut chunks = FramedRead::new(stderr, BytesCodec::new());
    while let Some(chunk) = chunks.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "Failed to read CLI stderr: {}", e);
                break;
            }
        };
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if text.is_empty() {
            continue;
        }
        tracing::warn!(session_id = %session_id, "CLI stderr: {}", text);
        let _ = events.send(SessionSignal::Event(ProtocolEvent::error(
            ErrorCode::CliStderr,
            text,
        )));
    }
}

/// Own the child: deliver control signals and publish its exit.
///
/// The exit is published only after the output pumps have finished, so every
/// line the process wrote is on the channel before `Exit`.
async fn monitor_process(
    session_id: String,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    mut control: mpsc::UnboundedReceiver<ProcessControl>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    events: broadcast::Sender<SessionSignal>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = control.recv() => deliver_signal(&session_id, &mut child, signal),
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from_status(&status),
        Err(e) => {
            let message = format!("Failed to wait for CLI process: {}", e);
            tracing::error!(session_id = %session_id, "{}", message);
            let _ = events.send(SessionSignal::Error {
                code: ErrorCode::CliIoError,
                message,
            });
            ExitInfo {
                code: None,
                signal: None,
            }
        }
    };

    tracing::info!(
        session_id = %session_id,
        exit_code = ?exit.code,
        signal = ?exit.signal,
        "CLI process exited"
    );

    drain_output(&session_id, pumps).await;
    exit_tx.send_replace(Some(exit));
    if exit.is_failure() {
        let code = exit.code.unwrap_or_default();
        let _ = events.send(SessionSignal::Event(ProtocolEvent::error(
            ErrorCode::CliExit,
            format!("CLI exited with code {}", code),
        )));
    }
    let _ = events.send(SessionSignal::Exit {
        code: exit.code,
        signal: exit.signal,
    });
}

/// Wait for the output pumps to reach EOF.
///
/// A grandchild that inherited the pipes can keep them open past the exit;
/// after `OUTPUT_DRAIN` the pumps are aborted.
async fn drain_output(session_id: &str, pumps: Vec<JoinHandle<()>>) {
    let aborts: Vec<_> = pumps.iter().map(|p| p.abort_handle()).collect();
    if tokio::time::timeout(OUTPUT_DRAIN, futures::future::join_all(pumps))
        .await
        .is_err()
    {
        tracing::warn!(
            session_id = %session_id,
            "CLI output still open {:?} after exit, abandoning it",
            OUTPUT_DRAIN
        );
        for abort in aborts {
            abort.abort();
        }
    }
}

fn deliver_signal(session_id: &str, child: &mut Child, signal: ProcessControl) {
    let result = match signal {
        ProcessControl::Terminate => send_sigterm(child),
        ProcessControl::Kill => child.start_kill(),
    };
    if let Err(e) = result {
        tracing::warn!(session_id, signal = ?signal, "Failed to signal CLI process: {}", e);
    }
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: kill(2) with a pid we spawned and have not yet reaped
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}
