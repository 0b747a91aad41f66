// ABOUTME: Which container engine an environment host runs and where its API socket is.
// ABOUTME: Detection produces a RuntimeInfo; an EngineOverride from config short-circuits it.

use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) const ROOTFUL_PODMAN_SOCKET: &str = "/run/podman/podman.sock";
pub(crate) const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    /// Socket used when config names the engine but not its socket.
    pub fn default_socket(self) -> &'static str {
        match self {
            RuntimeType::Docker => DOCKER_SOCKET,
            RuntimeType::Podman => ROOTFUL_PODMAN_SOCKET,
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub runtime_type: RuntimeType,
    /// Socket path on the environment host, not on the controller.
    pub socket_path: String,
}

/// `runtime:` and `socket:` from a server entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOverride {
    pub runtime: Option<RuntimeType>,
    pub socket: Option<String>,
}

impl EngineOverride {
    /// The engine to use without probing, if config names one.
    ///
    /// A socket without a runtime is not enough: the type still has to be detected.
    pub fn resolve(&self) -> Option<RuntimeInfo> {
        let runtime_type = self.runtime?;
        let socket_path = self
            .socket
            .clone()
            .unwrap_or_else(|| runtime_type.default_socket().to_string());
        Some(RuntimeInfo {
            runtime_type,
            socket_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_engine_without_socket_uses_default() {
        let engine = EngineOverride {
            runtime: Some(RuntimeType::Podman),
            socket: None,
        };
        assert_eq!(
            engine.resolve().unwrap().socket_path,
            "/run/podman/podman.sock"
        );
    }

    #[test]
    fn socket_alone_does_not_skip_detection() {
        let engine = EngineOverride {
            runtime: None,
            socket: Some("/tmp/engine.sock".to_string()),
        };
        assert_eq!(engine.resolve(), None);
    }
}
