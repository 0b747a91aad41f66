// ABOUTME: What the environment driver asks of a container engine.
// ABOUTME: Create/start/stop/remove/list, plus the creation settings and listing filters.

use super::Sealed;
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError>;

    /// Starting an already running container is not an error.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// SIGTERM, then SIGKILL once `timeout` has passed.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Everything needed to create one application container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    pub env: HashMap<String, String>,
    /// Ownership labels; how later runs find this container again.
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub restart_policy: RestartPolicyConfig,
    pub stop_timeout: Option<Duration>,
}

/// A TCP port published on the environment host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

/// Engine restart policy, independent of how the config file spells it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicyConfig {
    No,
    Always,
    #[default]
    UnlessStopped,
}

/// Listing filters; a container must satisfy every one that is set.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    pub labels: HashMap<String, String>,
    pub published_port: Option<u16>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    pub fn with_labels<'a>(
        labels: impl IntoIterator<Item = (&'a str, &'a str)>,
        all: bool,
    ) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            published_port: None,
            all,
        }
    }

    /// Any container, running or not, that publishes `port`.
    pub fn publishing(port: u16) -> Self {
        Self {
            published_port: Some(port),
            all: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Engine state, lowercased ("running", "exited", ...).
    pub state: String,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("no such container: {0}")]
    NotFound(String),

    #[error("container is not running: {0}")]
    NotRunning(String),

    #[error("container name already in use: {0}")]
    NameInUse(String),

    #[error("engine error: {0}")]
    Runtime(String),
}
