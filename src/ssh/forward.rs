// ABOUTME: Forwards the remote container engine socket over SSH.
// ABOUTME: A local Unix socket whose connections are each piped through a streamlocal channel.

use russh::client::Handle;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::error::{Error, Result};
use super::host_keys::HostKeyVerifier;

/// Grace period for the accept loop to wind down on close.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// A running forward. Dropping it stops accepting and removes the socket.
pub(crate) struct Forward {
    local_path: String,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Forward {
    /// Bind a fresh local socket and start piping connections to `remote_socket`.
    pub(crate) fn start(
        handle: Arc<Handle<HostKeyVerifier>>,
        remote_socket: &str,
    ) -> Result<Self> {
        let path = local_socket_path();
        let local_path = path
            .to_str()
            .ok_or_else(|| Error::SocketForwardFailed(format!("non UTF-8 path {path:?}")))?
            .to_string();

        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).map_err(|e| {
            Error::SocketForwardFailed(format!("cannot bind {local_path}: {e}"))
        })?;

        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            handle,
            remote_socket.to_string(),
            stopped,
        ));

        Ok(Self {
            local_path,
            stop,
            task: Some(task),
        })
    }

    pub(crate) fn local_path(&self) -> &str {
        &self.local_path
    }

    /// Stop accepting, drop open connections, and remove the socket file.
    pub(crate) async fn close(mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take()
            && tokio::time::timeout(CLOSE_GRACE, task).await.is_err()
        {
            tracing::debug!(socket = %self.local_path, "forward did not stop in time");
        }
    }
}

impl Drop for Forward {
    fn drop(&mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let _ = std::fs::remove_file(&self.local_path);
    }
}

fn local_socket_path() -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("promoter-{}-{}.sock", std::process::id(), n))
}

async fn accept_loop(
    listener: UnixListener,
    handle: Arc<Handle<HostKeyVerifier>>,
    remote_socket: String,
    mut stopped: watch::Receiver<bool>,
) {
    // Dropping the set when the loop ends aborts in-flight connections.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // Only `true` is ever sent; a dropped sender also means stop.
            _ = stopped.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let handle = Arc::clone(&handle);
                    let remote_socket = remote_socket.clone();
                    connections.spawn(async move {
                        if let Err(e) = pipe(stream, &handle, &remote_socket).await {
                            tracing::debug!(error = %e, "forwarded engine connection ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed on forwarded engine socket");
                    break;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn pipe(
    mut local: UnixStream,
    handle: &Handle<HostKeyVerifier>,
    remote_socket: &str,
) -> Result<()> {
    let channel = handle
        .channel_open_direct_streamlocal(remote_socket)
        .await
        .map_err(|e| {
            Error::SocketForwardFailed(format!("cannot open channel to {remote_socket}: {e}"))
        })?;

    let mut remote = Box::pin(channel.into_stream());
    let (sent, received) = tokio::io::copy_bidirectional(&mut local, &mut remote).await?;
    tracing::trace!(sent, received, "engine connection closed");
    Ok(())
}
