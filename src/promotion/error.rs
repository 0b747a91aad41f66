// ABOUTME: Errors that stop a promotion before it touches any environment.
// ABOUTME: Everything after the first deploy is reported through the outcome instead.

use crate::rollback::RecordError;
use crate::types::{EnvironmentName, ImageRef};

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("refusing to promote mutable tag {0}; promote the content-derived tag instead")]
    MutableTag(ImageRef),

    #[error("another promotion is in progress for {0}")]
    EnvironmentBusy(EnvironmentName),

    #[error(
        "an interrupted promotion of {candidate} is pending on {environment}; \
         run `promoter rollback {environment}` first"
    )]
    Interrupted {
        environment: EnvironmentName,
        candidate: ImageRef,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}
