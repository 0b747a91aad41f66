// ABOUTME: Environment driver: container lifecycle against one environment host.
// ABOUTME: Trait seam used by the controller plus the engine-backed implementation.

mod container;
mod error;

pub use container::{
    APP_LABEL, ContainerDriver, ENVIRONMENT_LABEL, IMAGE_LABEL, MANAGED_LABEL,
};
pub use error::{DeployError, DeployErrorKind};

use async_trait::async_trait;

use crate::environment::Environment;
use crate::types::ImageRef;

/// Operations against the single deployment of an environment.
#[async_trait]
pub trait EnvironmentDriver: Send + Sync {
    /// Image of the running deployment, or `None` if nothing is deployed.
    async fn current_image(&self, env: &Environment) -> Result<Option<ImageRef>, DeployError>;

    /// Pull `image`, clear whatever occupies the environment's port, and run it.
    ///
    /// After success exactly one container serves the environment's port.
    async fn deploy(&self, env: &Environment, image: &ImageRef) -> Result<(), DeployError>;

    /// Stop and remove the current deployment. No-op if there is none.
    async fn remove(&self, env: &Environment) -> Result<(), DeployError>;
}
