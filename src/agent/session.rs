//! Live session handle
//!
//! An [`AgentSession`] is what the launcher keeps in its registry for every
//! running CLI process. It owns the publish side of the session's event
//! channel, the control channel to the task that owns the `Child`, and the
//! queue feeding the child's stdin.

use crate::agent::types::{ExitInfo, InputMode, SessionInfo, SessionSignal};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

/// Signals delivered to the task that owns the child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessControl {
    /// Polite stop (SIGTERM)
    Terminate,
    /// Forced stop (SIGKILL)
    Kill,
}

/// Result of queueing bytes for the child's stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Queued,
    /// Queued, but the backlog is above the high-water mark
    Backpressured,
}

/// Registered session backed by one CLI process
pub struct AgentSession {
    pub id: String,
    pub cwd: PathBuf,
    pub input_mode: InputMode,
    /// Milliseconds since UNIX epoch
    pub created_at: i64,
    pid: Option<u32>,
    events: broadcast::Sender<SessionSignal>,
    exit: watch::Receiver<Option<ExitInfo>>,
    control: mpsc::UnboundedSender<ProcessControl>,
    input: InputChannel,
}

impl AgentSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        cwd: PathBuf,
        input_mode: InputMode,
        pid: Option<u32>,
        events: broadcast::Sender<SessionSignal>,
        exit: watch::Receiver<Option<ExitInfo>>,
        control: mpsc::UnboundedSender<ProcessControl>,
        input: InputChannel,
    ) -> Self {
        Self {
            id,
            cwd,
            input_mode,
            created_at: chrono::Utc::now().timestamp_millis(),
            pid,
            events,
            exit,
            control,
            input,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Subscribe to the session's event channel
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.events.subscribe()
    }

    pub fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            pid: self.pid,
            cwd: self.cwd.to_string_lossy().to_string(),
            input_mode: self.input_mode,
            created_at: self.created_at,
            alive: self.is_alive(),
        }
    }

    /// Wait until the process has exited, up to `timeout`.
    ///
    /// Returns `true` if the exit was observed.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let mut exit = self.exit.clone();
        tokio::time::timeout(timeout, exit.wait_for(|e| e.is_some()))
            .await
            .is_ok_and(|observed| observed.is_ok())
    }

    /// Whether the process is running and its stdin still accepts writes
    pub(crate) async fn accepts_input(&self) -> bool {
        self.is_alive() && self.input.is_writable().await
    }

    /// Number of live subscribers on the event channel
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub(crate) fn control(&self, signal: ProcessControl) -> bool {
        self.control.send(signal).is_ok()
    }

    pub(crate) fn input(&self) -> &InputChannel {
        &self.input
    }
}

/// Queue in front of the child's stdin.
///
/// Writes are handed to a dedicated writer task so callers never block on a
/// full pipe; `pending` tracks bytes accepted but not yet flushed.
pub(crate) struct InputChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    pending: Arc<watch::Sender<usize>>,
    closed: Arc<AtomicBool>,
    high_water_mark: usize,
}

impl InputChannel {
    /// Start the writer task for `stdin`
    pub(crate) fn spawn(session_id: String, stdin: ChildStdin, high_water_mark: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_input_writer(
            session_id,
            stdin,
            rx,
            pending.clone(),
            closed.clone(),
        ));

        Self {
            tx: Mutex::new(Some(tx)),
            pending,
            closed,
            high_water_mark,
        }
    }

    /// Channel for a process whose stdin was not captured
    pub(crate) fn detached() -> Self {
        let (pending, _) = watch::channel(0usize);
        Self {
            tx: Mutex::new(None),
            pending: Arc::new(pending),
            closed: Arc::new(AtomicBool::new(true)),
            high_water_mark: 0,
        }
    }

    pub(crate) async fn is_writable(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        matches!(&*self.tx.lock().await, Some(tx) if !tx.is_closed())
    }

    pub(crate) async fn write(&self, data: Bytes) -> crate::Result<WriteOutcome> {
        let guard = self.tx.lock().await;
        let tx = match &*guard {
            Some(tx) if !self.closed.load(Ordering::SeqCst) => tx,
            _ => return Err(crate::Error::Session("stdin is closed".to_string())),
        };

        let len = data.len();
        self.pending.send_modify(|n| *n += len);
        if tx.send(data).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(len));
            return Err(crate::Error::Session("stdin writer has stopped".to_string()));
        }

        if *self.pending.borrow() > self.high_water_mark {
            Ok(WriteOutcome::Backpressured)
        } else {
            Ok(WriteOutcome::Queued)
        }
    }

    /// Stop accepting input; queued bytes are still flushed before the pipe
    /// is closed.
    pub(crate) async fn close(&self) -> bool {
        self.tx.lock().await.take().is_some()
    }

    pub(crate) fn pending_bytes(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once every queued byte has been flushed
    pub(crate) fn drained(&self) -> impl std::future::Future<Output = bool> + Send + 'static {
        let mut rx = self.pending.subscribe();
        async move { rx.wait_for(|n| *n == 0).await.map(drop).is_ok() }
    }
}

async fn run_input_writer(
    session_id: String,
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    pending: Arc<watch::Sender<usize>>,
    closed: Arc<AtomicBool>,
) {
    while let Some(data) = rx.recv().await {
        let len = data.len();
        let result = async {
            stdin.write_all(&data).await?;
            stdin.flush().await
        }
        .await;
        pending.send_modify(|n| *n = n.saturating_sub(len));

        if let Err(e) = result {
            tracing::warn!(session_id = %session_id, "Failed to write to CLI stdin: {}", e);
            break;
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Anything still queued can no longer be delivered
    rx.close();
    while rx.try_recv().is_ok() {}
    pending.send_modify(|n| *n = 0);
    tracing::debug!(session_id = %session_id, "CLI stdin closed");
}
