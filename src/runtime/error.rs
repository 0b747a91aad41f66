// ABOUTME: Runtime error types with SNAFU pattern.
// ABOUTME: Unifies detection and connection errors for programmatic handling.

use snafu::Snafu;

use super::detection::DetectionError;

/// Failure to reach the engine API once a runtime was detected.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to forward engine socket {socket}: {reason}")]
    Forward { socket: String, reason: String },

    #[error("failed to open engine client at {socket}: {reason}")]
    Client { socket: String, reason: String },

    #[error("engine did not answer ping: {0}")]
    Ping(String),
}

/// Unified runtime error for detection and connection failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("runtime connection failed: {source}"))]
    Connection { source: ConnectError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// No container runtime found on the host.
    NoRuntimeFound,
    /// The host could not be probed.
    HostUnreachable,
    /// The engine socket could not be reached.
    ConnectionFailed,
}

impl RuntimeError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::Detection { source } => match source {
                DetectionError::NoRuntimeFound(_) => RuntimeErrorKind::NoRuntimeFound,
                DetectionError::Remote { .. } => RuntimeErrorKind::HostUnreachable,
            },
            RuntimeError::Connection { .. } => RuntimeErrorKind::ConnectionFailed,
        }
    }
}

impl From<DetectionError> for RuntimeError {
    fn from(source: DetectionError) -> Self {
        RuntimeError::Detection { source }
    }
}

impl From<ConnectError> for RuntimeError {
    fn from(source: ConnectError) -> Self {
        RuntimeError::Connection { source }
    }
}
