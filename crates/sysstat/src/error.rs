//! Error types for the sysstat client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors from talking to the daemon.
///
/// Connection errors usually mean the daemon is not running; check the
/// socket path or start it with `sysstatd start`.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to reach the daemon socket.
    #[error("Failed to connect to daemon at {path}: {reason}")]
    Connect { path: String, reason: String },

    /// The daemon speaks an incompatible protocol version.
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The daemon refused the handshake.
    #[error("Daemon rejected connection: {0}")]
    Rejected(String),

    /// The daemon answered with an error message.
    #[error("Daemon error: {message}")]
    Daemon {
        message: String,
        code: Option<String>,
    },

    /// A response did not match the request.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The daemon closed the connection.
    #[error("Daemon closed the connection")]
    Closed,

    /// No response within the request timeout.
    #[error("Timed out waiting for daemon")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            path: "/tmp/sysstat.sock".to_string(),
            reason: "No such file or directory".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("/tmp/sysstat.sock"));
        assert!(display.contains("No such file"));
    }

    #[test]
    fn test_version_mismatch_display() {
        let error = ClientError::VersionMismatch {
            client_version: "1.0".to_string(),
            daemon_version: "2.0".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("client: 1.0"));
        assert!(display.contains("daemon: 2.0"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let error: ClientError = io_error.into();
        assert!(matches!(error, ClientError::Io(_)));
    }
}
