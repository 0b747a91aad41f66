// ABOUTME: Bollard-based container engine implementation.
// ABOUTME: Talks to Docker or Podman through the Docker-compatible API socket.

use crate::runtime::traits::Sealed;
use crate::runtime::traits::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerOps, ContainerSummary, ImageError,
    ImageOps, RestartPolicyConfig,
};
use crate::runtime::error::ConnectError;
use crate::runtime::types::{RuntimeInfo, RuntimeType};
use crate::ssh::Session;
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

/// Seconds the engine client waits for a single API call.
const API_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn status_of(e: &bollard::errors::Error) -> Option<(u16, &str)> {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn map_image_pull_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match status_of(&e) {
        Some((404, _)) => ImageError::NotFound(image_name.to_string()),
        Some((401 | 403, message)) => {
            ImageError::AuthenticationFailed(format!("{}: {}", image_name, message))
        }
        _ => ImageError::PullFailed(format!("{}: {}", image_name, e)),
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match status_of(&e) {
        Some((409, message)) => ContainerError::NameInUse(message.to_string()),
        Some((404, message)) => ContainerError::Runtime(format!("image not present: {message}")),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

/// 304 means the container was already running.
fn map_container_start_error(e: bollard::errors::Error) -> Result<(), ContainerError> {
    match status_of(&e) {
        Some((304, _)) => Ok(()),
        Some((404, message)) => Err(ContainerError::NotFound(message.to_string())),
        _ => Err(ContainerError::Runtime(e.to_string())),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match status_of(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::NotRunning(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match status_of(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container engine client using bollard.
///
/// Works for both Docker and Podman via the Docker-compatible API.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl std::fmt::Debug for BollardRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BollardRuntime")
            .field("runtime_type", &self.runtime_type)
            .finish()
    }
}

impl BollardRuntime {
    /// Create a new BollardRuntime from a Docker client.
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Get the runtime type (Docker or Podman).
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// Check that the engine answers API calls.
    pub async fn ping(&self) -> Result<(), ConnectError> {
        self.client
            .ping()
            .await
            .map_err(|e| ConnectError::Ping(e.to_string()))?;
        Ok(())
    }
}

fn open_client(socket: &str, runtime_type: RuntimeType) -> Result<BollardRuntime, ConnectError> {
    let client = Docker::connect_with_unix(socket, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        .map_err(|e| ConnectError::Client {
            socket: socket.to_string(),
            reason: e.to_string(),
        })?;
    Ok(BollardRuntime::new(client, runtime_type))
}

/// Connect to the engine on the machine running the controller.
pub async fn connect_local(info: &RuntimeInfo) -> Result<BollardRuntime, ConnectError> {
    let runtime = open_client(&info.socket_path, info.runtime_type)?;
    runtime.ping().await?;
    Ok(runtime)
}

/// Connect to the engine on a remote host.
///
/// Forwards the detected engine socket through the SSH session and talks to
/// the local end of the tunnel.
pub async fn connect_via_session(
    session: &Session,
    info: &RuntimeInfo,
) -> Result<BollardRuntime, ConnectError> {
    let local_socket =
        session
            .forward_socket(&info.socket_path)
            .await
            .map_err(|e| ConnectError::Forward {
                socket: info.socket_path.clone(),
                reason: e.to_string(),
            })?;

    tracing::debug!(
        remote = %info.socket_path,
        local = %local_socket,
        "forwarded engine socket"
    );

    let runtime = open_client(&local_socket, info.runtime_type)?;
    runtime.ping().await?;
    Ok(runtime)
}

impl Sealed for BollardRuntime {}

fn restart_policy(policy: RestartPolicyConfig) -> RestartPolicy {
    let name = match policy {
        RestartPolicyConfig::No => RestartPolicyNameEnum::NO,
        RestartPolicyConfig::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicyConfig::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    };
    RestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

/// Exposed `port/tcp` keys and their host bindings, all interfaces.
fn published_ports(
    config: &ContainerConfig,
) -> (Vec<String>, HashMap<String, Option<Vec<PortBinding>>>) {
    config
        .ports
        .iter()
        .map(|port| {
            let key = format!("{}/tcp", port.container_port);
            let binding = PortBinding {
                host_ip: None,
                host_port: Some(port.host_port.to_string()),
            };
            (key.clone(), (key, Some(vec![binding])))
        })
        .unzip()
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        // Pull returns a stream of progress updates; errors may arrive mid-stream.
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            let progress = result.map_err(|e| map_image_pull_error(e, &image_name))?;
            if let Some(status) = progress.status {
                tracing::trace!(image = %image_name, "{}", status);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let (exposed_ports, port_bindings) = published_ports(config);

        let container_config = ContainerCreateBody {
            image: Some(config.image.to_string()),
            env: (!env.is_empty()).then_some(env),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(HostConfig {
                restart_policy: Some(restart_policy(config.restart_policy)),
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                ..Default::default()
            }),
            stop_timeout: config.stop_timeout.map(|d| d.as_secs() as i64),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), container_config)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .or_else(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }

        if let Some(port) = filters.published_port {
            filter_map.insert("publish".to_string(), vec![port.to_string()]);
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        // Podman reports transient "stopping"/"stopped" states that bollard
        // cannot deserialize. Retry briefly.
        let mut last_error = None;
        for attempt in 0..3 {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => {
                    return Ok(containers
                        .into_iter()
                        .map(|c| {
                            let name = c
                                .names
                                .unwrap_or_default()
                                .first()
                                .map(|n| n.trim_start_matches('/').to_string())
                                .unwrap_or_default();

                            ContainerSummary {
                                id: ContainerId::new(c.id.unwrap_or_default()),
                                name,
                                image: c.image.unwrap_or_default(),
                                state: c
                                    .state
                                    .map(|s| format!("{:?}", s).to_lowercase())
                                    .unwrap_or_default(),
                                labels: c.labels.unwrap_or_default(),
                            }
                        })
                        .collect());
                }
                Err(e) => {
                    let err_str = e.to_string();
                    if (err_str.contains("unknown variant `stopping`")
                        || err_str.contains("unknown variant `stopped`"))
                        && attempt < 2
                    {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        last_error = Some(err_str);
                        continue;
                    }
                    return Err(ContainerError::Runtime(err_str));
                }
            }
        }

        Err(ContainerError::Runtime(
            last_error.unwrap_or_else(|| "list_containers failed".to_string()),
        ))
    }
}
