// ABOUTME: Error types for environment driver operations.
// ABOUTME: Pull, container lifecycle, and host connectivity failures.

use crate::runtime::{ContainerError, ImageError};
use crate::types::{EnvironmentName, ImageRef};

/// Errors from deploying to, inspecting, or clearing an environment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Registry unreachable, image missing, or access denied.
    #[error("failed to pull {image}: {source}")]
    Pull {
        image: ImageRef,
        #[source]
        source: ImageError,
    },

    /// A container lifecycle call failed.
    #[error("failed to {operation} container for {environment}: {source}")]
    Container {
        environment: EnvironmentName,
        operation: &'static str,
        #[source]
        source: ContainerError,
    },

    /// The environment host could not be reached.
    #[error("environment host {host} unavailable: {reason}")]
    Unavailable { host: String, reason: String },

    /// The running container carries an image reference that cannot be parsed.
    #[error("running container {container} has unrecognized image {image:?}")]
    UnknownImage { container: String, image: String },
}

/// Coarse category of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Pull,
    Container,
    Unavailable,
    Inspect,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Pull { .. } => DeployErrorKind::Pull,
            DeployError::Container { .. } => DeployErrorKind::Container,
            DeployError::Unavailable { .. } => DeployErrorKind::Unavailable,
            DeployError::UnknownImage { .. } => DeployErrorKind::Inspect,
        }
    }

    pub(crate) fn container<'a>(
        environment: &'a EnvironmentName,
        operation: &'static str,
    ) -> impl FnOnce(ContainerError) -> DeployError + 'a {
        move |source| DeployError::Container {
            environment: environment.clone(),
            operation,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_error_names_the_image() {
        let image = ImageRef::parse("registry.example.com/app:abc123").unwrap();
        let err = DeployError::Pull {
            image,
            source: ImageError::NotFound("app".to_string()),
        };
        assert_eq!(err.kind(), DeployErrorKind::Pull);
        assert!(
            err.to_string()
                .starts_with("failed to pull registry.example.com/app:abc123")
        );
    }

    #[test]
    fn container_error_names_operation_and_environment() {
        let env = EnvironmentName::staging();
        let err = DeployError::container(&env, "start")(ContainerError::Runtime("boom".into()));
        assert_eq!(err.kind(), DeployErrorKind::Container);
        assert_eq!(
            err.to_string(),
            "failed to start container for staging: runtime error: boom"
        );
    }
}
