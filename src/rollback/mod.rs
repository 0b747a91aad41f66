// ABOUTME: Snapshot-before-replace and explicit restore for an environment.
// ABOUTME: Keeps the deployment record in step with what the driver actually runs.

mod record;

pub use record::{
    DeploymentRecord, FileRecordStore, MemoryRecordStore, PendingPromotion, RecordError,
    RecordStore, RollbackPlan,
};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::driver::{DeployError, EnvironmentDriver};
use crate::environment::Environment;
use crate::types::ImageRef;

/// How a restore ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "image", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// The previous image is running again.
    Restored(ImageRef),
    /// Nothing ran before; the environment was left empty.
    NoPriorImage,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read current image: {0}")]
    Inspect(#[from] DeployError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, thiserror::Error)]
pub enum ManualRollbackError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

/// Captures and restores the previous deployment of an environment.
#[derive(Clone)]
pub struct RollbackManager {
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for RollbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackManager").finish_non_exhaustive()
    }
}

impl RollbackManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Capture what `env` runs now, before `candidate` replaces it.
    ///
    /// The snapshot is persisted as a pending promotion so an interrupted
    /// run can still be rolled back by hand.
    pub async fn snapshot(
        &self,
        driver: &dyn EnvironmentDriver,
        env: &Environment,
        candidate: &ImageRef,
    ) -> Result<Option<ImageRef>, SnapshotError> {
        let current = driver.current_image(env).await?;

        let mut record = self.store.load_or_new(&env.name).await?;
        record.pending = Some(PendingPromotion {
            candidate: candidate.clone(),
            previous: current.clone(),
            started_at: Utc::now(),
        });
        record.touch();
        self.store.save(&record).await?;

        tracing::info!(
            environment = %env.name,
            previous = current.as_ref().map(ToString::to_string).as_deref().unwrap_or("none"),
            "captured snapshot"
        );
        Ok(current)
    }

    /// Record that `deployed` replaced `previous` in `env`.
    pub async fn record_deploy(
        &self,
        env: &Environment,
        previous: Option<&ImageRef>,
        deployed: &ImageRef,
    ) -> Result<(), RecordError> {
        let mut record = self.store.load_or_new(&env.name).await?;
        record.previous = previous.cloned();
        record.current = Some(deployed.clone());
        record.touch();
        self.store.save(&record).await
    }

    /// Record a deploy that took no snapshot: the recorded current image
    /// becomes the previous one.
    pub async fn record_replacement(
        &self,
        env: &Environment,
        deployed: &ImageRef,
    ) -> Result<(), RecordError> {
        let mut record = self.store.load_or_new(&env.name).await?;
        if record.current.as_ref() != Some(deployed) {
            record.previous = record.current.take();
            record.current = Some(deployed.clone());
        }
        record.touch();
        self.store.save(&record).await
    }

    /// Put `previous` back in `env`, removing whatever runs there now.
    ///
    /// With no previous image the environment is cleared and
    /// [`RestoreOutcome::NoPriorImage`] is returned. Calling this twice with
    /// the same `previous` leaves the same state as calling it once.
    pub async fn restore(
        &self,
        driver: &dyn EnvironmentDriver,
        env: &Environment,
        previous: Option<&ImageRef>,
    ) -> Result<RestoreOutcome, DeployError> {
        driver.remove(env).await?;

        let outcome = match previous {
            Some(image) => {
                driver.deploy(env, image).await?;
                tracing::info!(environment = %env.name, %image, "restored previous image");
                RestoreOutcome::Restored(image.clone())
            }
            None => {
                tracing::warn!(environment = %env.name, "no prior image; environment left empty");
                RestoreOutcome::NoPriorImage
            }
        };

        if let Err(e) = self.record_restore(env, previous).await {
            tracing::warn!(environment = %env.name, error = %e, "failed to update deployment record");
        }
        Ok(outcome)
    }

    /// Undo what the record of `env` says needs undoing.
    ///
    /// Restores the interrupted promotion's snapshot, else the recorded
    /// previous image. An interrupted first deploy is cleared, which also
    /// drops the pending snapshot. `Ok(None)` when there is nothing to undo.
    pub async fn rollback(
        &self,
        driver: &dyn EnvironmentDriver,
        env: &Environment,
    ) -> Result<Option<RestoreOutcome>, ManualRollbackError> {
        let record = self.store.load_or_new(&env.name).await?;
        let previous = match record.rollback_plan() {
            None => return Ok(None),
            Some(RollbackPlan::Restore(image)) => Some(image.clone()),
            Some(RollbackPlan::Clear) => None,
        };
        Ok(Some(self.restore(driver, env, previous.as_ref()).await?))
    }

    async fn record_restore(
        &self,
        env: &Environment,
        previous: Option<&ImageRef>,
    ) -> Result<(), RecordError> {
        let mut record = self.store.load_or_new(&env.name).await?;
        record.current = previous.cloned();
        record.previous = None;
        record.pending = None;
        record.touch();
        self.store.save(&record).await
    }

    /// Forget the pending snapshot once a promotion has finished.
    pub async fn clear_pending(&self, env: &Environment) -> Result<(), RecordError> {
        let mut record = self.store.load_or_new(&env.name).await?;
        if record.pending.take().is_some() {
            record.touch();
            self.store.save(&record).await?;
        }
        Ok(())
    }
}
