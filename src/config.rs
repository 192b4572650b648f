//! RelayChat configuration management

use crate::agent::types::InputMode;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main RelayChat configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Working directory for spawned sessions (None = current directory)
    pub project_dir: Option<PathBuf>,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Assistant CLI configuration
    pub cli: CliConfig,

    /// Event relay and lifecycle timings
    pub relay: RelaySettings,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Resolve the project directory, falling back to the process cwd
    pub fn project_dir(&self) -> PathBuf {
        self.project_dir.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3456,
            cors_origins: Vec::new(),
        }
    }
}

/// Assistant CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Executable name or path (None = resolve `claude`)
    pub binary: Option<PathBuf>,

    /// Arguments placed before the protocol flags
    pub leading_args: Vec<String>,

    /// How user messages are encoded on the CLI's stdin
    pub input_mode: InputMode,

    /// Extra environment variables for the child process
    pub env: HashMap<String, String>,
}

/// Event relay and lifecycle timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// SSE heartbeat comment interval in seconds
    pub heartbeat_interval_secs: u64,

    /// Ceiling for the blocking collect-until-complete request
    pub collect_timeout_secs: u64,

    /// Grace period between the polite and the forced termination signal
    pub terminate_grace_ms: u64,

    /// How long shutdown waits for in-flight requests
    pub shutdown_drain_secs: u64,

    /// Per-session event buffer size
    pub event_capacity: usize,

    /// Queued stdin bytes above which a send is reported as backpressured
    pub input_high_water_mark: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15,
            collect_timeout_secs: 30,
            terminate_grace_ms: 1000,
            shutdown_drain_secs: 5,
            event_capacity: 256,
            input_high_water_mark: 16 * 1024,
        }
    }
}

impl RelaySettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}
