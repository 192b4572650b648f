//! Fake CLI fixtures for agent tests

use crate::agent::launcher::AgentLauncher;
use crate::agent::types::SessionSignal;
use crate::config::{CliConfig, RelaySettings};
use crate::protocol::ProtocolEvent;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const SIGNAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Launcher whose "CLI" is `/bin/sh` running `script`.
///
/// The script is passed as a leading argument, so the protocol flags that
/// follow it become the script's positional parameters and are ignored.
pub(crate) fn script_launcher(script: &str) -> (AgentLauncher, TempDir) {
    script_launcher_with(script, fast_settings())
}

pub(crate) fn script_launcher_with(script: &str, relay: RelaySettings) -> (AgentLauncher, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fake-cli.sh");
    std::fs::write(&path, script).unwrap();

    let cli = CliConfig {
        binary: Some(PathBuf::from("/bin/sh")),
        leading_args: vec![path.to_string_lossy().to_string()],
        ..Default::default()
    };
    (AgentLauncher::new(cli, relay), dir)
}

pub(crate) fn fast_settings() -> RelaySettings {
    RelaySettings {
        heartbeat_interval_secs: 1,
        collect_timeout_secs: 5,
        terminate_grace_ms: 200,
        ..Default::default()
    }
}

pub(crate) async fn next_signal(rx: &mut broadcast::Receiver<SessionSignal>) -> SessionSignal {
    tokio::time::timeout(SIGNAL_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a session signal")
        .expect("session channel closed")
}

/// Next browser-facing event, skipping internal signals
pub(crate) async fn wait_for_event(rx: &mut broadcast::Receiver<SessionSignal>) -> ProtocolEvent {
    loop {
        if let SessionSignal::Event(event) = next_signal(rx).await {
            return event;
        }
    }
}
