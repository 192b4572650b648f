//! RelayChat error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable code carried by `error` protocol events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The assistant CLI executable could not be located
    CliNotFound,
    /// The executable exists but could not be executed
    CliPermissionDenied,
    /// Any other spawn failure
    CliSpawnFailed,
    /// Diagnostic text written by the CLI on standard error
    CliStderr,
    /// The CLI exited with a non-zero status
    CliExit,
    /// Reading from or writing to the CLI's pipes failed
    CliIoError,
}

impl ErrorCode {
    /// Classify an OS-level spawn failure
    pub fn from_spawn_error(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::CliNotFound,
            std::io::ErrorKind::PermissionDenied => Self::CliPermissionDenied,
            _ => Self::CliSpawnFailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CliNotFound => "CLI_NOT_FOUND",
            Self::CliPermissionDenied => "CLI_PERMISSION_DENIED",
            Self::CliSpawnFailed => "CLI_SPAWN_FAILED",
            Self::CliStderr => "CLI_STDERR",
            Self::CliExit => "CLI_EXIT",
            Self::CliIoError => "CLI_IO_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RelayChat error type
#[derive(Error, Debug)]
pub enum Error {
    /// Assistant CLI is not installed or not resolvable
    #[error("CLI not found: {0}")]
    CliNotFound(String),

    /// Subprocess could not be started
    #[error("Spawn error ({code}): {message}")]
    Spawn { code: ErrorCode, message: String },

    /// Session lookup or state error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bounded wait elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for RelayChat operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::CliPermissionDenied).unwrap();
        assert_eq!(json, "\"CLI_PERMISSION_DENIED\"");
        assert_eq!(ErrorCode::CliExit.to_string(), "CLI_EXIT");
    }

    #[test]
    fn test_spawn_error_classification() {
        let not_found = std::io::Error::from(std::io::ErrorKind::NotFound);
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let other = std::io::Error::from(std::io::ErrorKind::Other);
        assert_eq!(ErrorCode::from_spawn_error(&not_found), ErrorCode::CliNotFound);
        assert_eq!(
            ErrorCode::from_spawn_error(&denied),
            ErrorCode::CliPermissionDenied
        );
        assert_eq!(ErrorCode::from_spawn_error(&other), ErrorCode::CliSpawnFailed);
    }

    #[test]
    fn test_spawn_error_display() {
        let err = Error::Spawn {
            code: ErrorCode::CliNotFound,
            message: "no such file".to_string(),
        };
        assert_eq!(err.to_string(), "Spawn error (CLI_NOT_FOUND): no such file");
    }
}
