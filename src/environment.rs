// ABOUTME: Resolved deployment target settings for one environment.
// ABOUTME: Shared by the environment driver, the health verifier, and the controller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::runtime::RestartPolicyConfig;
use crate::types::EnvironmentName;

/// Where the health probe for an environment is issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthSource {
    /// Probe from the machine running the controller (public address).
    #[default]
    Controller,
    /// Probe from inside the deployment host, usually against localhost.
    Host,
}

/// A named deployment target with exactly one current deployment.
#[derive(Debug, Clone)]
pub struct Environment {
    pub name: EnvironmentName,
    /// Application name, used for container naming and labels.
    pub app: String,
    /// Host port the container is exposed on.
    pub port: u16,
    /// Port the application listens on inside the container.
    pub container_port: u16,
    pub health_url: String,
    pub health_source: HealthSource,
    /// Container environment, already resolved.
    pub env: HashMap<String, String>,
    pub stop_timeout: Duration,
    pub restart_policy: RestartPolicyConfig,
}

impl Environment {
    pub fn new(name: EnvironmentName, app: impl Into<String>, port: u16) -> Self {
        Self {
            health_url: format!("http://localhost:{}/", port),
            name,
            app: app.into(),
            port,
            container_port: port,
            health_source: HealthSource::default(),
            env: HashMap::new(),
            stop_timeout: Duration::from_secs(10),
            restart_policy: RestartPolicyConfig::UnlessStopped,
        }
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = url.into();
        self
    }

    pub fn with_health_source(mut self, source: HealthSource) -> Self {
        self.health_source = source;
        self
    }

    pub fn with_container_port(mut self, port: u16) -> Self {
        self.container_port = port;
        self
    }

    /// Container name for the single deployment of this environment.
    pub fn container_name(&self) -> String {
        format!("{}-{}", self.app, self.name)
    }
}
