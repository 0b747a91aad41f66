// ABOUTME: Remote execution channel: run shell commands on an environment host.
// ABOUTME: Implemented by the local shell and by SSH sessions.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::ssh::Session;

/// Output from a shell command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors from the execution channel itself (not from the command).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("failed to run local shell: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),
}

/// Runs `sh -c` style commands on one host.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Host label for logs and lock info.
    fn host(&self) -> &str;

    /// Run a command and collect its output. A non-zero exit is not an error.
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError>;
}

/// Runs commands on the machine running the controller.
#[derive(Debug, Default, Clone)]
pub struct LocalShell;

#[async_trait]
impl CommandRunner for LocalShell {
    fn host(&self) -> &str {
        "localhost"
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        tracing::debug!(command, "running local command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandOutput {
            // Killed by signal: no code, report as generic failure.
            exit_code: output.status.code().map(|c| c as u32).unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for Session {
    fn host(&self) -> &str {
        Session::host(self)
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        tracing::debug!(host = Session::host(self), command, "running remote command");
        Ok(self.exec(command).await?)
    }
}

/// Quote a value for safe use as a single POSIX shell word.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
