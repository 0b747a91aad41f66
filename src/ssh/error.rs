// ABOUTME: SSH transport errors for the remote execution channel.
// ABOUTME: Connection, host key, authentication, command, and forwarding failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("SSH connection failed: {0}")]
    Connection(String),

    #[error("{0}")]
    HostKeyRejected(String),

    #[error("SSH authentication failed: no offered key was accepted")]
    AuthenticationFailed,

    #[error("no SSH credentials: {0}")]
    AgentUnavailable(String),

    #[error("failed to load SSH key {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("remote command failed: {0}")]
    CommandFailed(String),

    #[error("remote command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("channel closed before the command reported an exit status")]
    ChannelClosed,

    #[error("engine socket forwarding failed: {0}")]
    SocketForwardFailed(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
