// ABOUTME: State transition methods for promotion runs.
// ABOUTME: Each consumes the run and returns the next state, or the run back with the cause.

use super::approval::{ApprovalGate, ApprovalOutcome};
use super::controller::Target;
use super::outcome::{HealthCheck, PromotionState};
use super::run::Promotion;
use super::state::{
    Approved, AwaitingApproval, Idle, ProductionDeployed, ProductionDeploying, ProductionHealthy,
    ProductionUnhealthy, StagingDeployed, StagingHealthy,
};
use crate::cancel::CancelToken;
use crate::driver::DeployError;
use crate::health::{HealthReport, HealthVerifier};
use crate::rollback::{RestoreOutcome, RollbackManager, SnapshotError};
use crate::types::ImageRef;
use std::time::Duration;

/// Result type for transitions whose failure hands the run back.
pub type TransitionResult<T, S, E = DeployError> = Result<Promotion<T>, (Promotion<S>, E)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Promotion<S> {
    async fn check_health(
        &mut self,
        target: &Target,
        verifier: &HealthVerifier,
        cancel: &CancelToken,
    ) -> HealthReport {
        let url = target.environment.health_url.clone();
        tracing::info!(
            environment = %target.environment.name,
            url = %url,
            max_attempts = verifier.policy().max_attempts,
            "verifying health"
        );

        let report = verifier.verify(target.probe.as_ref(), &url, cancel).await;
        self.health_checks.push(HealthCheck {
            environment: target.environment.name.clone(),
            url,
            report: report.clone(),
        });
        report
    }

    async fn restore_snapshot(
        &self,
        target: &Target,
        rollback: &RollbackManager,
        previous: Option<&ImageRef>,
    ) -> Result<RestoreOutcome, DeployError> {
        tracing::warn!(
            environment = %target.environment.name,
            candidate = %self.candidate,
            "restoring previous deployment"
        );
        rollback
            .restore(target.driver.as_ref(), &target.environment, previous)
            .await
    }
}

// =============================================================================
// Idle -> StagingDeployed
// =============================================================================

impl Promotion<Idle> {
    /// Deploy the candidate to staging.
    #[must_use = "promotion state must be used"]
    pub async fn deploy_staging(self, staging: &Target) -> TransitionResult<StagingDeployed, Idle> {
        match staging
            .driver
            .deploy(&staging.environment, &self.candidate)
            .await
        {
            Ok(()) => Ok(self.transition(StagingDeployed, Some(PromotionState::StagingDeployed))),
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// StagingDeployed -> StagingHealthy
// =============================================================================

impl Promotion<StagingDeployed> {
    /// Verify staging. An unhealthy staging is never rolled back.
    #[must_use = "promotion state must be used"]
    pub async fn verify_staging(
        mut self,
        staging: &Target,
        verifier: &HealthVerifier,
        cancel: &CancelToken,
    ) -> TransitionResult<StagingHealthy, StagingDeployed, HealthReport> {
        let report = self.check_health(staging, verifier, cancel).await;
        if report.is_healthy() {
            Ok(self.transition(StagingHealthy, Some(PromotionState::StagingHealthy)))
        } else {
            Err((self, report))
        }
    }
}

// =============================================================================
// StagingHealthy -> AwaitingApproval -> Approved
// =============================================================================

impl Promotion<StagingHealthy> {
    /// Stop at the approval gate on the way to production.
    pub fn request_approval(self) -> Promotion<AwaitingApproval> {
        self.transition(AwaitingApproval, Some(PromotionState::AwaitingApproval))
    }
}

impl Promotion<AwaitingApproval> {
    /// Block on the gate until a decision, the timeout, or cancellation.
    #[must_use = "promotion state must be used"]
    pub async fn await_approval(
        self,
        gate: ApprovalGate,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> TransitionResult<Approved, AwaitingApproval, ApprovalOutcome> {
        tracing::info!(candidate = %self.candidate, ?timeout, "waiting for approval");
        match gate.wait(timeout, cancel).await {
            ApprovalOutcome::Approved => Ok(self.transition(Approved, None)),
            other => Err((self, other)),
        }
    }
}

// =============================================================================
// Approved -> ProductionDeploying
// =============================================================================

impl Promotion<Approved> {
    /// Capture what production runs now. Must precede any production deploy.
    #[must_use = "promotion state must be used"]
    pub async fn snapshot_production(
        self,
        production: &Target,
        rollback: &RollbackManager,
    ) -> TransitionResult<ProductionDeploying, Approved, SnapshotError> {
        match rollback
            .snapshot(
                production.driver.as_ref(),
                &production.environment,
                &self.candidate,
            )
            .await
        {
            Ok(previous) => Ok(self.transition(
                ProductionDeploying { previous },
                Some(PromotionState::ProductionDeploying),
            )),
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// ProductionDeploying -> ProductionDeployed
// =============================================================================

impl Promotion<ProductionDeploying> {
    /// Replace production with the candidate. Not retried on failure.
    #[must_use = "promotion state must be used"]
    pub async fn deploy_production(
        self,
        production: &Target,
    ) -> TransitionResult<ProductionDeployed, ProductionDeploying> {
        match production
            .driver
            .deploy(&production.environment, &self.candidate)
            .await
        {
            Ok(()) => {
                let previous = self.state.previous.clone();
                Ok(self.transition(ProductionDeployed { previous }, None))
            }
            Err(e) => Err((self, e)),
        }
    }

    /// Put the snapshot back after a failed deploy or before the deploy ran.
    pub async fn restore(
        self,
        production: &Target,
        rollback: &RollbackManager,
    ) -> (Self, Result<RestoreOutcome, DeployError>) {
        let result = self
            .restore_snapshot(production, rollback, self.state.previous.as_ref())
            .await;
        (self, result)
    }
}

// =============================================================================
// ProductionDeployed -> ProductionHealthy | ProductionUnhealthy
// =============================================================================

impl Promotion<ProductionDeployed> {
    /// Verify production. Cancellation counts as unhealthy so the caller restores.
    pub async fn verify_production(
        mut self,
        production: &Target,
        verifier: &HealthVerifier,
        cancel: &CancelToken,
    ) -> Result<Promotion<ProductionHealthy>, Promotion<ProductionUnhealthy>> {
        let report = self.check_health(production, verifier, cancel).await;
        let previous = self.state.previous.clone();
        if report.is_healthy() {
            Ok(self.transition(
                ProductionHealthy { previous },
                Some(PromotionState::ProductionHealthy),
            ))
        } else {
            Err(self.transition(
                ProductionUnhealthy { previous, report },
                Some(PromotionState::ProductionUnhealthy),
            ))
        }
    }
}

impl Promotion<ProductionHealthy> {
    /// Image production ran before the candidate.
    pub fn replaced(&self) -> Option<&ImageRef> {
        self.state.previous.as_ref()
    }
}

// =============================================================================
// ProductionUnhealthy -> RolledBack | RollbackFailed
// =============================================================================

impl Promotion<ProductionUnhealthy> {
    /// Restore the snapshot taken before the candidate replaced production.
    pub async fn restore(
        self,
        production: &Target,
        rollback: &RollbackManager,
    ) -> (Self, Result<RestoreOutcome, DeployError>) {
        let result = self
            .restore_snapshot(production, rollback, self.state.previous.as_ref())
            .await;
        (self, result)
    }
}
