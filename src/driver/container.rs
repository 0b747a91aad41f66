// ABOUTME: Environment driver backed by a container engine API.
// ABOUTME: One labelled container per (app, environment), bound to the environment's port.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::{DeployError, EnvironmentDriver};
use crate::environment::Environment;
use crate::runtime::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerOps, ContainerSummary, ImageOps,
    PortMapping,
};
use crate::types::ImageRef;

/// Marks containers created by this tool.
pub const MANAGED_LABEL: &str = "promoter.managed";
/// Application the container belongs to.
pub const APP_LABEL: &str = "promoter.app";
/// Environment the container serves.
pub const ENVIRONMENT_LABEL: &str = "promoter.environment";
/// Exact image reference the container was deployed from.
pub const IMAGE_LABEL: &str = "promoter.image";

/// Drives an environment through a container engine.
#[derive(Debug)]
pub struct ContainerDriver<R> {
    runtime: R,
}

impl<R> ContainerDriver<R>
where
    R: ImageOps + ContainerOps,
{
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    fn managed_filters(env: &Environment, all: bool) -> ContainerFilters {
        ContainerFilters::with_labels(
            [
                (MANAGED_LABEL, "true"),
                (APP_LABEL, env.app.as_str()),
                (ENVIRONMENT_LABEL, env.name.as_str()),
            ],
            all,
        )
    }

    fn container_config(env: &Environment, image: &ImageRef) -> ContainerConfig {
        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (APP_LABEL.to_string(), env.app.clone()),
            (ENVIRONMENT_LABEL.to_string(), env.name.to_string()),
            (IMAGE_LABEL.to_string(), image.to_string()),
        ]);

        ContainerConfig {
            name: env.container_name(),
            image: image.clone(),
            env: env.env.clone(),
            labels,
            ports: vec![PortMapping {
                host_port: env.port,
                container_port: env.container_port,
            }],
            restart_policy: env.restart_policy,
            stop_timeout: Some(env.stop_timeout),
        }
    }

    /// Managed containers of the environment plus anything else holding its port.
    async fn occupants(&self, env: &Environment) -> Result<Vec<ContainerSummary>, DeployError> {
        let managed = self
            .runtime
            .list_containers(&Self::managed_filters(env, true))
            .await
            .map_err(DeployError::container(&env.name, "list"))?;
        let on_port = self
            .runtime
            .list_containers(&ContainerFilters::publishing(env.port))
            .await
            .map_err(DeployError::container(&env.name, "list"))?;

        let mut seen = HashSet::new();
        Ok(managed
            .into_iter()
            .chain(on_port)
            .filter(|c| seen.insert(c.id.clone()))
            .collect())
    }

    async fn clear(
        &self,
        env: &Environment,
        containers: Vec<ContainerSummary>,
    ) -> Result<(), DeployError> {
        for container in containers {
            tracing::debug!(
                environment = %env.name,
                container = %container.name,
                id = container.id.short(),
                "removing container"
            );

            if container.is_running() {
                match self
                    .runtime
                    .stop_container(&container.id, env.stop_timeout)
                    .await
                {
                    Ok(()) | Err(ContainerError::NotRunning(_)) | Err(ContainerError::NotFound(_)) => {}
                    Err(e) => return Err(DeployError::container(&env.name, "stop")(e)),
                }
            }

            match self.runtime.remove_container(&container.id, true).await {
                Ok(()) | Err(ContainerError::NotFound(_)) => {}
                Err(e) => return Err(DeployError::container(&env.name, "remove")(e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R> EnvironmentDriver for ContainerDriver<R>
where
    R: ImageOps + ContainerOps,
{
    async fn current_image(&self, env: &Environment) -> Result<Option<ImageRef>, DeployError> {
        let containers = self
            .runtime
            .list_containers(&Self::managed_filters(env, false))
            .await
            .map_err(DeployError::container(&env.name, "list"))?;

        let Some(running) = containers.into_iter().find(|c| c.is_running()) else {
            return Ok(None);
        };

        let rendered = running
            .labels
            .get(IMAGE_LABEL)
            .cloned()
            .unwrap_or_else(|| running.image.clone());

        ImageRef::parse(&rendered)
            .map(Some)
            .map_err(|_| DeployError::UnknownImage {
                container: running.name,
                image: rendered,
            })
    }

    async fn deploy(&self, env: &Environment, image: &ImageRef) -> Result<(), DeployError> {
        tracing::info!(environment = %env.name, %image, "pulling image");
        self.runtime
            .pull_image(image)
            .await
            .map_err(|source| DeployError::Pull {
                image: image.clone(),
                source,
            })?;

        let occupants = self.occupants(env).await?;
        self.clear(env, occupants).await?;

        let config = Self::container_config(env, image);
        let id = self
            .runtime
            .create_container(&config)
            .await
            .map_err(DeployError::container(&env.name, "create"))?;

        if let Err(e) = self.runtime.start_container(&id).await {
            // Leave the port free rather than a created-but-dead container.
            if let Err(cleanup) = self.runtime.remove_container(&id, true).await {
                tracing::warn!(
                    environment = %env.name,
                    container = id.short(),
                    error = %cleanup,
                    "failed to remove container that did not start"
                );
            }
            return Err(DeployError::container(&env.name, "start")(e));
        }

        tracing::info!(
            environment = %env.name,
            %image,
            container = id.short(),
            port = env.port,
            "container started"
        );
        Ok(())
    }

    async fn remove(&self, env: &Environment) -> Result<(), DeployError> {
        let managed = self
            .runtime
            .list_containers(&Self::managed_filters(env, true))
            .await
            .map_err(DeployError::container(&env.name, "list"))?;
        self.clear(env, managed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ImageError, Sealed};
    use crate::types::{ContainerId, EnvironmentName};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct FakeContainer {
        id: ContainerId,
        config_name: String,
        image: String,
        labels: HashMap<String, String>,
        host_ports: Vec<u16>,
        running: bool,
    }

    /// In-memory engine tracking containers and pulls.
    #[derive(Default)]
    struct FakeEngine {
        containers: Mutex<Vec<FakeContainer>>,
        missing_images: Vec<String>,
        fail_start: bool,
        fail_remove: bool,
        next_id: Mutex<u32>,
    }

    impl FakeEngine {
        fn with_foreign_container_on(port: u16) -> Self {
            let engine = FakeEngine::default();
            engine.containers.lock().push(FakeContainer {
                id: ContainerId::new("foreign0000000001"),
                config_name: "legacy".to_string(),
                image: "other/thing:1".to_string(),
                labels: HashMap::new(),
                host_ports: vec![port],
                running: true,
            });
            engine
        }

        fn names(&self) -> Vec<String> {
            self.containers
                .lock()
                .iter()
                .map(|c| c.config_name.clone())
                .collect()
        }
    }

    impl Sealed for FakeEngine {}

    #[async_trait]
    impl ImageOps for FakeEngine {
        async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
            if self.missing_images.contains(&reference.to_string()) {
                return Err(ImageError::NotFound(reference.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerOps for FakeEngine {
        async fn create_container(
            &self,
            config: &ContainerConfig,
        ) -> Result<ContainerId, ContainerError> {
            let mut next = self.next_id.lock();
            *next += 1;
            let id = ContainerId::new(format!("{:016}", *next));
            self.containers.lock().push(FakeContainer {
                id: id.clone(),
                config_name: config.name.clone(),
                image: config.image.to_string(),
                labels: config.labels.clone(),
                host_ports: config.ports.iter().map(|p| p.host_port).collect(),
                running: false,
            });
            Ok(id)
        }

        async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
            if self.fail_start {
                return Err(ContainerError::Runtime("port is already allocated".into()));
            }
            let mut containers = self.containers.lock();
            let container = containers
                .iter_mut()
                .find(|c| &c.id == id)
                .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
            container.running = true;
            Ok(())
        }

        async fn stop_container(
            &self,
            id: &ContainerId,
            _timeout: Duration,
        ) -> Result<(), ContainerError> {
            let mut containers = self.containers.lock();
            let container = containers
                .iter_mut()
                .find(|c| &c.id == id)
                .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
            container.running = false;
            Ok(())
        }

        async fn remove_container(
            &self,
            id: &ContainerId,
            _force: bool,
        ) -> Result<(), ContainerError> {
            if self.fail_remove {
                return Err(ContainerError::Runtime("device or resource busy".into()));
            }
            let mut containers = self.containers.lock();
            let before = containers.len();
            containers.retain(|c| &c.id != id);
            if containers.len() == before {
                return Err(ContainerError::NotFound(id.to_string()));
            }
            Ok(())
        }

        async fn list_containers(
            &self,
            filters: &ContainerFilters,
        ) -> Result<Vec<ContainerSummary>, ContainerError> {
            Ok(self
                .containers
                .lock()
                .iter()
                .filter(|c| filters.all || c.running)
                .filter(|c| {
                    filters
                        .labels
                        .iter()
                        .all(|(k, v)| c.labels.get(k) == Some(v))
                })
                .filter(|c| {
                    filters
                        .published_port
                        .is_none_or(|port| c.host_ports.contains(&port))
                })
                .map(|c| ContainerSummary {
                    id: c.id.clone(),
                    name: c.config_name.clone(),
                    image: c.image.clone(),
                    state: if c.running { "running" } else { "exited" }.to_string(),
                    labels: c.labels.clone(),
                })
                .collect())
        }
    }

    fn staging() -> Environment {
        Environment::new(EnvironmentName::staging(), "shop", 8080).with_container_port(3000)
    }

    fn image(tag: &str) -> ImageRef {
        ImageRef::new("registry.example.com", "shop", tag).unwrap()
    }

    #[tokio::test]
    async fn empty_environment_has_no_current_image() {
        let driver = ContainerDriver::new(FakeEngine::default());
        assert_eq!(driver.current_image(&staging()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deploy_then_current_image_returns_deployed_reference() {
        let driver = ContainerDriver::new(FakeEngine::default());
        driver.deploy(&staging(), &image("abc123")).await.unwrap();

        assert_eq!(
            driver.current_image(&staging()).await.unwrap(),
            Some(image("abc123"))
        );
        assert_eq!(driver.runtime().names(), vec!["shop-staging"]);
    }

    #[tokio::test]
    async fn redeploy_leaves_exactly_one_container() {
        let driver = ContainerDriver::new(FakeEngine::default());
        driver.deploy(&staging(), &image("abc123")).await.unwrap();
        driver.deploy(&staging(), &image("def456")).await.unwrap();

        assert_eq!(driver.runtime().containers.lock().len(), 1);
        assert_eq!(
            driver.current_image(&staging()).await.unwrap(),
            Some(image("def456"))
        );
    }

    #[tokio::test]
    async fn deploy_evicts_unmanaged_container_holding_the_port() {
        let driver = ContainerDriver::new(FakeEngine::with_foreign_container_on(8080));
        driver.deploy(&staging(), &image("abc123")).await.unwrap();
        assert_eq!(driver.runtime().names(), vec!["shop-staging"]);
    }

    #[tokio::test]
    async fn missing_image_is_a_pull_error_and_leaves_environment_untouched() {
        let engine = FakeEngine {
            missing_images: vec![image("nope").to_string()],
            ..Default::default()
        };
        let driver = ContainerDriver::new(engine);
        driver.deploy(&staging(), &image("abc123")).await.unwrap();

        let err = driver.deploy(&staging(), &image("nope")).await.unwrap_err();
        assert!(matches!(err, DeployError::Pull { .. }));
        assert_eq!(
            driver.current_image(&staging()).await.unwrap(),
            Some(image("abc123"))
        );
    }

    #[tokio::test]
    async fn start_failure_removes_created_container() {
        let engine = FakeEngine {
            fail_start: true,
            ..Default::default()
        };
        let driver = ContainerDriver::new(engine);

        let err = driver.deploy(&staging(), &image("abc123")).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Container {
                operation: "start",
                ..
            }
        ));
        assert!(driver.runtime().containers.lock().is_empty());
    }

    #[tokio::test]
    async fn remove_is_a_no_op_when_nothing_is_deployed() {
        let driver = ContainerDriver::new(FakeEngine::default());
        driver.remove(&staging()).await.unwrap();
        driver.deploy(&staging(), &image("abc123")).await.unwrap();
        driver.remove(&staging()).await.unwrap();
        driver.remove(&staging()).await.unwrap();
        assert_eq!(driver.current_image(&staging()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn environments_do_not_see_each_other() {
        let driver = ContainerDriver::new(FakeEngine::default());
        let production =
            Environment::new(EnvironmentName::production(), "shop", 80).with_container_port(3000);
        driver.deploy(&staging(), &image("abc123")).await.unwrap();

        assert_eq!(driver.current_image(&production).await.unwrap(), None);
    }

    #[tokio::test]
    async fn start_failure_is_reported_even_when_cleanup_fails() {
        let engine = FakeEngine {
            fail_start: true,
            fail_remove: true,
            ..Default::default()
        };
        let driver = ContainerDriver::new(engine);

        let err = driver.deploy(&staging(), &image("abc123")).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Container {
                operation: "start",
                ..
            }
        ));
        assert_eq!(driver.runtime().containers.lock().len(), 1);
        assert_eq!(driver.current_image(&staging()).await.unwrap(), None);
    }

    proptest! {
        #[test]
        fn deployed_reference_reads_back_from_label(
            registry in "[a-z0-9.:_-]{1,12}",
            repository in "[a-z0-9.:_/-]{1,16}",
            tag in "[A-Za-z0-9._-]{1,10}",
        ) {
            let img = ImageRef::new(registry, repository, tag).unwrap();
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let current = rt.block_on(async {
                let driver = ContainerDriver::new(FakeEngine::default());
                driver.deploy(&staging(), &img).await.unwrap();
                driver.current_image(&staging()).await.unwrap()
            });
            prop_assert_eq!(current, Some(img));
        }
    }
}
