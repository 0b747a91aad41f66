// ABOUTME: Configuration types and parsing for promoter.yml.
// ABOUTME: Handles YAML parsing, validation, CLI overrides and per-environment resolution.

mod deserialize;
mod env_value;
mod health;
mod init;
mod lifecycle;
mod server;

pub use env_value::{EnvValue, merge_env, resolve_env_map};
pub use health::{ApprovalConfig, HealthConfig};
pub use init::init_config;
pub use lifecycle::{RestartPolicy, StopConfig};
pub use server::{LOCAL_SERVER, Server, ServerConfig};

use deserialize::{deserialize_app_name, deserialize_image_ref, deserialize_server};

use crate::environment::{Environment, HealthSource};
use crate::error::{Error, Result};
use crate::types::{EnvironmentName, ImageRef};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "promoter.yml";
pub const CONFIG_FILENAME_ALT: &str = "promoter.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".promoter/config.yml";

/// Records and lock files live here unless `state_dir` says otherwise.
const DEFAULT_STATE_DIR: &str = ".local/state/promoter";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_app_name")]
    pub app: String,

    /// Image repository; its tag is replaced by `--tag`.
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    pub environments: Environments,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub stop: StopConfig,

    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Environments {
    pub staging: EnvironmentConfig,
    pub production: EnvironmentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(deserialize_with = "deserialize_server")]
    pub server: Server,

    /// Host port the application is published on.
    pub port: u16,

    #[serde(default)]
    pub container_port: Option<u16>,

    #[serde(default)]
    pub health_url: Option<String>,

    #[serde(default)]
    pub health_from: Option<HealthSource>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub health_attempts: Option<u32>,
    pub health_interval: Option<Duration>,
    pub approval_timeout: Option<Duration>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.health.attempts == 0 {
            return Err(Error::InvalidConfig(
                "health.attempts must be at least 1".to_string(),
            ));
        }

        for (name, env) in self.named_environments() {
            if env.port == 0 {
                return Err(Error::InvalidConfig(format!("{}.port must not be 0", name)));
            }
            if env.container_port == Some(0) {
                return Err(Error::InvalidConfig(format!(
                    "{}.container_port must not be 0",
                    name
                )));
            }
            if let Some(url) = &env.health_url {
                let url = url.trim();
                if url.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "{}.health_url must not be empty",
                        name
                    )));
                }
                if !url.starts_with("http://") {
                    return Err(Error::InvalidConfig(format!(
                        "{}.health_url must be an http:// URL: {}",
                        name, url
                    )));
                }
            }
        }

        let staging = &self.environments.staging;
        let production = &self.environments.production;
        if staging.server == production.server && staging.port == production.port {
            return Err(Error::InvalidConfig(
                "staging and production cannot share a server and port".to_string(),
            ));
        }

        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(attempts) = overrides.health_attempts {
            self.health.attempts = attempts;
        }
        if let Some(interval) = overrides.health_interval {
            self.health.interval = interval;
        }
        if let Some(timeout) = overrides.approval_timeout {
            self.approval.timeout = timeout;
        }
        self.validate()
    }

    /// Candidate for a run: an explicit reference wins, then `tag` applied
    /// to the configured repository, then the configured image as-is.
    pub fn candidate(&self, tag: Option<&str>, image: Option<&ImageRef>) -> Result<ImageRef> {
        match (image, tag) {
            (Some(image), _) => Ok(image.clone()),
            (None, Some(tag)) => self
                .image
                .with_tag(tag)
                .map_err(|e| Error::InvalidConfig(e.to_string())),
            (None, None) => Ok(self.image.clone()),
        }
    }

    pub fn environment_config(&self, name: &EnvironmentName) -> Result<&EnvironmentConfig> {
        if *name == EnvironmentName::staging() {
            Ok(&self.environments.staging)
        } else if *name == EnvironmentName::production() {
            Ok(&self.environments.production)
        } else {
            Err(Error::UnknownEnvironment(name.to_string()))
        }
    }

    /// Resolve the settings of one environment, reading referenced env vars.
    pub fn environment(&self, name: &EnvironmentName) -> Result<Environment> {
        let config = self.environment_config(name)?;
        let health_source = config
            .health_from
            .unwrap_or_else(|| default_health_source(name));

        let health_url = match &config.health_url {
            Some(url) => url.trim().to_string(),
            None => {
                let host = match health_source {
                    HealthSource::Controller => config.server.host(),
                    HealthSource::Host => "localhost",
                };
                format!("http://{}:{}/", host, config.port)
            }
        };

        let mut environment = Environment::new(name.clone(), self.app.clone(), config.port)
            .with_container_port(config.container_port.unwrap_or(config.port))
            .with_health_url(health_url)
            .with_health_source(health_source);
        environment.env = resolve_env_map(&merge_env(&self.env, &config.env))?;
        environment.stop_timeout = self.stop.timeout;
        environment.restart_policy = self.restart.into();

        Ok(environment)
    }

    /// Directory holding deployment records, with a leading `~` expanded.
    pub fn state_dir(&self) -> Result<PathBuf> {
        let home = || {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| Error::InvalidConfig("HOME is not set".to_string()))
        };

        match &self.state_dir {
            Some(dir) => match dir.strip_prefix("~") {
                Ok(rest) => Ok(home()?.join(rest)),
                Err(_) => Ok(dir.clone()),
            },
            None => Ok(home()?.join(DEFAULT_STATE_DIR)),
        }
    }

    fn named_environments(&self) -> [(&'static str, &EnvironmentConfig); 2] {
        [
            ("staging", &self.environments.staging),
            ("production", &self.environments.production),
        ]
    }
}

/// Staging is probed from the controller, production from inside its host.
fn default_health_source(name: &EnvironmentName) -> HealthSource {
    if *name == EnvironmentName::production() {
        HealthSource::Host
    } else {
        HealthSource::Controller
    }
}
