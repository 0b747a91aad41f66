// ABOUTME: Container engine detection for local and remote hosts.
// ABOUTME: Checks for Podman sockets first, then Docker, unless configured explicitly.

use std::path::Path;

use super::types::{
    DOCKER_SOCKET, EngineOverride, ROOTFUL_PODMAN_SOCKET, RuntimeInfo, RuntimeType,
};
use crate::remote::{CommandRunner, RemoteError, quote};

/// Error during engine detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found on {0} (checked Podman and Docker sockets)")]
    NoRuntimeFound(String),

    #[error("failed to probe {host} for a container runtime: {source}")]
    Remote {
        host: String,
        #[source]
        source: RemoteError,
    },
}

/// Detect the engine on the machine running the controller.
///
/// Detection order:
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
pub fn detect_local(config: Option<&EngineOverride>) -> Result<RuntimeInfo, DetectionError> {
    if let Some(info) = config.and_then(EngineOverride::resolve) {
        return Ok(info);
    }

    if let Some(uid) = local_uid() {
        let rootless_socket = rootless_podman(&uid);
        if Path::new(&rootless_socket).exists() {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: rootless_socket,
            });
        }
    }

    if Path::new(ROOTFUL_PODMAN_SOCKET).exists() {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN_SOCKET.to_string(),
        });
    }

    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound("localhost".to_string()))
}

/// Detect the engine on an environment host through its command channel.
///
/// Same order as [`detect_local`]; an explicit config wins.
pub async fn detect_runtime<C: CommandRunner + ?Sized>(
    runner: &C,
    config: Option<&EngineOverride>,
) -> Result<RuntimeInfo, DetectionError> {
    if let Some(info) = config.and_then(EngineOverride::resolve) {
        return Ok(info);
    }

    let remote_err = |source| DetectionError::Remote {
        host: runner.host().to_string(),
        source,
    };

    let uid_output = runner.run("id -u").await.map_err(remote_err)?;
    if uid_output.success() {
        let rootless_socket = rootless_podman(uid_output.stdout.trim());
        if socket_exists(runner, &rootless_socket)
            .await
            .map_err(remote_err)?
        {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: rootless_socket,
            });
        }
    }

    if socket_exists(runner, ROOTFUL_PODMAN_SOCKET)
        .await
        .map_err(remote_err)?
    {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN_SOCKET.to_string(),
        });
    }

    if socket_exists(runner, DOCKER_SOCKET)
        .await
        .map_err(remote_err)?
    {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound(runner.host().to_string()))
}

async fn socket_exists<C: CommandRunner + ?Sized>(
    runner: &C,
    path: &str,
) -> Result<bool, RemoteError> {
    let output = runner
        .run(&format!("test -S {} && echo exists", quote(path)))
        .await?;
    Ok(output.success() && output.stdout.trim() == "exists")
}

fn rootless_podman(uid: &str) -> String {
    format!("/run/user/{}/podman/podman.sock", uid)
}

fn local_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}
