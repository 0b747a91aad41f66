// ABOUTME: An authenticated SSH session to an environment host.
// ABOUTME: Runs shell commands and owns the engine socket forwards opened through it.

use parking_lot::Mutex;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;

use super::auth::Credentials;
use super::config::SessionConfig;
use super::error::{Error, Result};
use super::forward::Forward;
use super::host_keys::HostKeyVerifier;
use crate::remote::CommandOutput;

/// SSH extended data type carrying stderr.
const STDERR: u32 = 1;

pub struct Session {
    config: SessionConfig,
    handle: Arc<Handle<HostKeyVerifier>>,
    forwards: Mutex<Vec<Forward>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.config.address())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open, verify, and authenticate a session.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        tracing::debug!(address = %config.address(), "connecting");
        let credentials = Credentials::resolve(config.identity.as_deref()).await?;

        let (verifier, rejection) = HostKeyVerifier::new(
            config.host.clone(),
            config.port,
            config.host_keys,
            config.known_hosts.clone(),
        );
        let client_config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        });

        let connecting = client::connect(
            client_config,
            (config.host.as_str(), config.port),
            verifier,
        );
        let mut handle = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(match rejection.lock().take() {
                    Some(reason) => Error::HostKeyRejected(reason),
                    None => Error::Connection(format!("{}: {}", config.address(), e)),
                });
            }
            Err(_) => {
                return Err(Error::Connection(format!(
                    "{}: no answer within {:?}",
                    config.address(),
                    config.connect_timeout
                )));
            }
        };

        if !credentials.authenticate(&mut handle, &config.user).await? {
            return Err(Error::AuthenticationFailed);
        }
        tracing::info!(address = %config.address(), "SSH session established");

        Ok(Self {
            config,
            handle: Arc::new(handle),
            forwards: Mutex::new(Vec::new()),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Run `command` through the remote user's shell, bounded by the
    /// configured command timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let timeout = self.config.command_timeout;
        tokio::time::timeout(timeout, self.exec_unbounded(command))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))?
    }

    async fn exec_unbounded(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("cannot open channel: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("cannot start command: {e}")))?;

        let mut collected = Collected::default();
        while let Some(msg) = channel.wait().await {
            if collected.absorb(msg) {
                break;
            }
        }
        collected.finish()
    }

    /// Tunnel a fresh local Unix socket to `remote_socket` on the host.
    ///
    /// Returns the local path. The forward lives until [`disconnect`](Self::disconnect).
    pub async fn forward_socket(&self, remote_socket: &str) -> Result<String> {
        let forward = Forward::start(Arc::clone(&self.handle), remote_socket)?;
        let path = forward.local_path().to_string();
        self.forwards.lock().push(forward);
        Ok(path)
    }

    /// Close forwards, then the session.
    pub async fn disconnect(&self) -> Result<()> {
        let forwards: Vec<Forward> = self.forwards.lock().drain(..).collect();
        for forward in forwards {
            forward.close().await;
        }

        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Output of one exec channel as it arrives.
#[derive(Debug, Default)]
struct Collected {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<u32>,
    eof: bool,
}

impl Collected {
    /// Take one message; `true` once nothing more is expected.
    fn absorb(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => self.stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext } if ext == STDERR => {
                self.stderr.extend_from_slice(&data)
            }
            ChannelMsg::ExitStatus { exit_status } => self.exit_code = Some(exit_status),
            ChannelMsg::Eof => self.eof = true,
            ChannelMsg::Close => return true,
            _ => {}
        }
        self.eof && self.exit_code.is_some()
    }

    /// A channel that closed without an exit status died with the connection.
    fn finish(self) -> Result<CommandOutput> {
        let exit_code = self.exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finishes_once_status_and_eof_both_arrived() {
        let mut collected = Collected::default();
        collected.stdout.extend_from_slice(b"hello");
        collected.stderr.extend_from_slice(b"warn");

        assert!(!collected.absorb(ChannelMsg::ExitStatus { exit_status: 7 }));
        assert!(collected.absorb(ChannelMsg::Eof));

        let output = collected.finish().unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "warn");
        assert_eq!(output.exit_code, 7);
    }

    #[test]
    fn eof_before_exit_status_waits_for_status() {
        let mut collected = Collected::default();
        assert!(!collected.absorb(ChannelMsg::Eof));
        assert!(collected.absorb(ChannelMsg::ExitStatus { exit_status: 0 }));
        assert_eq!(collected.finish().unwrap().exit_code, 0);
    }

    #[test]
    fn close_without_status_is_an_error() {
        let mut collected = Collected::default();
        assert!(collected.absorb(ChannelMsg::Close));
        assert!(matches!(collected.finish(), Err(Error::ChannelClosed)));
    }
}
