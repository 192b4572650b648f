//! Gateway server implementation

use crate::agent::{AgentLauncher, AgentState};
use crate::api::build_app;
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Gateway server state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayState {
    /// Not started
    Stopped,
    /// Accepting connections
    Running,
    /// Draining requests and terminating sessions
    ShuttingDown,
}

/// RelayChat HTTP gateway
pub struct Gateway {
    config: RelayConfig,
    state: Arc<RwLock<GatewayState>>,
    agent: AgentState,
}

impl Gateway {
    /// Create a new gateway with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        let launcher = Arc::new(AgentLauncher::new(
            config.cli.clone(),
            config.relay.clone(),
        ));
        let agent = AgentState::new(launcher, config.project_dir());
        Self {
            config,
            state: Arc::new(RwLock::new(GatewayState::Stopped)),
            agent,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn agent_state(&self) -> &AgentState {
        &self.agent
    }

    pub async fn state(&self) -> GatewayState {
        *self.state.read().await
    }

    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            state: self.state().await,
            session_count: self.agent.launcher.list_sessions().await.len(),
            in_flight: self.agent.tracker.in_flight(),
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    ///
    /// On shutdown, in-flight streams get `shutdown_drain_secs` to finish
    /// before every CLI process is terminated.
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: SocketAddr = listener.local_addr()?;
        let app = build_app(self.agent.clone(), &self.config.server.cors_origins);

        *self.state.write().await = GatewayState::Running;
        tracing::info!(
            "RelayChat listening on http://{} (project: {})",
            local,
            self.agent.project_dir.display()
        );

        let state = self.state.clone();
        let agent = self.agent.clone();
        let drain = self.config.relay.shutdown_drain();
        let graceful = async move {
            shutdown.await;
            tracing::info!("Shutting down...");
            *state.write().await = GatewayState::ShuttingDown;
            drain_and_terminate(&agent, drain).await;
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await?;

        *self.state.write().await = GatewayState::Stopped;
        tracing::info!("RelayChat stopped");
        Ok(())
    }

    /// Drain in-flight requests, then terminate every session
    pub async fn stop(&self) {
        *self.state.write().await = GatewayState::ShuttingDown;
        drain_and_terminate(&self.agent, self.config.relay.shutdown_drain()).await;
        *self.state.write().await = GatewayState::Stopped;
    }
}

async fn drain_and_terminate(agent: &AgentState, drain: std::time::Duration) {
    let in_flight = agent.tracker.in_flight();
    if in_flight > 0 {
        tracing::info!(in_flight, "Waiting for in-flight requests");
        if !agent.tracker.wait_idle(drain).await {
            tracing::warn!(
                in_flight = agent.tracker.in_flight(),
                "Requests still in flight after {:?}, terminating anyway",
                drain
            );
        }
    }
    agent.launcher.terminate_all().await;
}

/// Gateway status snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub state: GatewayState,
    pub session_count: usize,
    /// Open SSE streams and pending collect requests
    pub in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> RelayConfig {
        let mut config = RelayConfig {
            project_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        config.relay.shutdown_drain_secs = 1;
        config.relay.terminate_grace_ms = 200;
        config
    }

    #[tokio::test]
    async fn test_gateway_starts_stopped() {
        let dir = tempfile::TempDir::new().unwrap();
        let gateway = Gateway::new(test_config(dir.path()));
        assert_eq!(gateway.state().await, GatewayState::Stopped);

        let status = gateway.status().await;
        assert_eq!(status.session_count, 0);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = tempfile::TempDir::new().unwrap();
        let gateway = Arc::new(Gateway::new(test_config(dir.path())));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .serve_on(listener, async move {
                        let _ = rx.await;
                    })
                    .await
            })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while gateway.state().await != GatewayState::Running {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(gateway.state().await, GatewayState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_terminates_sessions() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-cli.sh");
        std::fs::write(&script, "while read line; do :; done\n").unwrap();

        let mut config = test_config(dir.path());
        config.cli.binary = Some("/bin/sh".into());
        config.cli.leading_args = vec![script.to_string_lossy().to_string()];
        let gateway = Gateway::new(config);

        let launcher = gateway.agent_state().launcher.clone();
        launcher
            .spawn(dir.path(), None, Default::default())
            .await
            .unwrap();
        assert_eq!(gateway.status().await.session_count, 1);

        gateway.stop().await;
        assert!(launcher.list_sessions().await.is_empty());
        assert_eq!(gateway.state().await, GatewayState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_waits_for_drain_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let gateway = Gateway::new(test_config(dir.path()));
        let _guard = gateway.agent_state().tracker.begin();

        let started = std::time::Instant::now();
        gateway.stop().await;
        assert!(started.elapsed() >= Duration::from_millis(900));
    }
}
