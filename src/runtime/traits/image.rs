// ABOUTME: Image pulls through the container engine.
// ABOUTME: Failures say whether the image is missing or the registry refused us.

use super::Sealed;
use crate::types::ImageRef;
use async_trait::async_trait;

#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Pull `reference` exactly as written, with the engine's registry credentials.
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("registry refused credentials for {0}")]
    AuthenticationFailed(String),

    #[error("pull failed: {0}")]
    PullFailed(String),
}
