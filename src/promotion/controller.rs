// ABOUTME: Promotion controller: sequences staging, approval, production, and recovery.
// ABOUTME: Holds per-environment locks for the run and reports what each environment runs afterwards.

use std::sync::Arc;
use std::time::Duration;

use super::approval::{ApprovalGate, ApprovalOutcome};
use super::error::PromotionError;
use super::lock::{EnvironmentGuard, EnvironmentLocks};
use super::outcome::{
    Destination, EnvironmentStatus, FailureReason, Outcome, PromotionReport, PromotionState,
    Running,
};
use super::run::Promotion;
use super::state::Idle;
use crate::cancel::CancelToken;
use crate::diagnostics::{Diagnostics, Warning};
use crate::driver::{DeployError, EnvironmentDriver};
use crate::environment::Environment;
use crate::health::{HealthPolicy, HealthReport, HealthStatus, HealthVerifier, Probe};
use crate::rollback::{RestoreOutcome, RollbackManager};
use crate::types::ImageRef;

/// Default wait for the approval signal.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// An environment with the driver and probe that reach it.
#[derive(Clone)]
pub struct Target {
    pub environment: Environment,
    pub driver: Arc<dyn EnvironmentDriver>,
    pub probe: Arc<dyn Probe>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("environment", &self.environment.name)
            .finish_non_exhaustive()
    }
}

impl Target {
    pub fn new(
        environment: Environment,
        driver: Arc<dyn EnvironmentDriver>,
        probe: Arc<dyn Probe>,
    ) -> Self {
        Self {
            environment,
            driver,
            probe,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromotionRequest {
    pub candidate: ImageRef,
    pub destination: Destination,
}

impl PromotionRequest {
    pub fn to_production(candidate: ImageRef) -> Self {
        Self {
            candidate,
            destination: Destination::Production,
        }
    }

    pub fn to_staging(candidate: ImageRef) -> Self {
        Self {
            candidate,
            destination: Destination::Staging,
        }
    }
}

/// Called with every reported state as the run enters it.
pub type StateObserver = Arc<dyn Fn(PromotionState) + Send + Sync>;

/// Orchestrates promotion runs between one staging and one production target.
pub struct PromotionController {
    staging: Target,
    production: Target,
    verifier: HealthVerifier,
    rollback: RollbackManager,
    locks: EnvironmentLocks,
    approval_timeout: Duration,
    observer: Option<StateObserver>,
}

impl std::fmt::Debug for PromotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionController")
            .field("staging", &self.staging)
            .field("production", &self.production)
            .field("policy", self.verifier.policy())
            .field("approval_timeout", &self.approval_timeout)
            .finish_non_exhaustive()
    }
}

impl PromotionController {
    pub fn new(staging: Target, production: Target, rollback: RollbackManager) -> Self {
        Self {
            staging,
            production,
            verifier: HealthVerifier::default(),
            rollback,
            locks: EnvironmentLocks::new(),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            observer: None,
        }
    }

    pub fn with_health_policy(mut self, policy: HealthPolicy) -> Self {
        self.verifier = HealthVerifier::new(policy);
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Share a lock registry with other controllers in this process.
    pub fn with_locks(mut self, locks: EnvironmentLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn on_state(mut self, observer: impl Fn(PromotionState) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn staging(&self) -> &Target {
        &self.staging
    }

    pub fn production(&self) -> &Target {
        &self.production
    }

    pub fn locks(&self) -> &EnvironmentLocks {
        &self.locks
    }

    /// Run one promotion to its terminal state.
    ///
    /// Errors only when the run is refused before touching any environment;
    /// every started run ends in a report.
    pub async fn run(
        &self,
        request: PromotionRequest,
        gate: ApprovalGate,
        cancel: &CancelToken,
    ) -> Result<PromotionReport, PromotionError> {
        let PromotionRequest {
            candidate,
            destination,
        } = request;

        if candidate.is_mutable_alias() {
            return Err(PromotionError::MutableTag(candidate));
        }

        // Production stays claimed for the whole run, approval wait included.
        let production_guard = match destination {
            Destination::Production => Some(self.acquire(&self.production)?),
            Destination::Staging => None,
        };
        let staging_guard = self.acquire(&self.staging)?;

        if destination == Destination::Production {
            let record = self
                .rollback
                .store()
                .load_or_new(&self.production.environment.name)
                .await?;
            if let Some(pending) = record.pending {
                return Err(PromotionError::Interrupted {
                    environment: self.production.environment.name.clone(),
                    candidate: pending.candidate,
                });
            }
        }

        tracing::info!(%candidate, %destination, "starting promotion");
        self.notify(PromotionState::Idle);

        let mut diagnostics = Diagnostics::default();
        let mut touched: Vec<&Target> = Vec::new();
        let run = Promotion::new(candidate, destination);

        let mut report = self
            .drive(run, staging_guard, gate, cancel, &mut touched, &mut diagnostics)
            .await;
        if report.final_state().is_terminal() {
            self.notify(report.final_state());
        }

        report.environments = self.read_back(&touched, &mut diagnostics).await;
        drop(production_guard);

        report.warnings = diagnostics.into_messages();
        Ok(report)
    }

    fn acquire(&self, target: &Target) -> Result<EnvironmentGuard, PromotionError> {
        self.locks
            .try_acquire(&target.environment.name)
            .ok_or_else(|| PromotionError::EnvironmentBusy(target.environment.name.clone()))
    }

    fn notify(&self, state: PromotionState) {
        if let Some(observer) = &self.observer {
            observer(state);
        }
    }

    async fn drive<'a>(
        &'a self,
        run: Promotion<Idle>,
        staging_guard: EnvironmentGuard,
        gate: ApprovalGate,
        cancel: &CancelToken,
        touched: &mut Vec<&'a Target>,
        diagnostics: &mut Diagnostics,
    ) -> PromotionReport {
        let staging = &self.staging;
        let production = &self.production;

        if cancel.is_cancelled() {
            return run.finish(Outcome::failed(FailureReason::Cancelled), None);
        }

        // Staging: deploy, verify. Never rolled back.
        touched.push(staging);
        let run = match run.deploy_staging(staging).await {
            Ok(run) => run,
            Err((run, e)) => {
                return run.finish(
                    Outcome::failed(FailureReason::StagingDeploy),
                    Some(e.to_string()),
                );
            }
        };
        self.notify(PromotionState::StagingDeployed);

        let run = match run.verify_staging(staging, &self.verifier, cancel).await {
            Ok(run) => run,
            Err((run, report)) => {
                let reason = match report.status {
                    HealthStatus::Cancelled => FailureReason::Cancelled,
                    _ => FailureReason::StagingUnhealthy,
                };
                return run.finish(Outcome::failed(reason), failure_detail(&report));
            }
        };
        self.notify(PromotionState::StagingHealthy);

        if let Err(e) = self
            .rollback
            .record_replacement(&staging.environment, run.candidate())
            .await
        {
            diagnostics.warn(Warning::record_update(e.to_string()));
        }
        drop(staging_guard);

        if run.destination() == Destination::Staging {
            return run.finish(Outcome::Staged, None);
        }

        // Approval gate. Production untouched until it opens.
        let run = run.request_approval();
        self.notify(PromotionState::AwaitingApproval);

        let run = match run.await_approval(gate, self.approval_timeout, cancel).await {
            Ok(run) => run,
            Err((run, outcome)) => {
                let reason = match outcome {
                    ApprovalOutcome::Rejected => FailureReason::ApprovalRejected,
                    ApprovalOutcome::Cancelled => FailureReason::Cancelled,
                    ApprovalOutcome::TimedOut | ApprovalOutcome::Approved => {
                        FailureReason::ApprovalTimeout
                    }
                };
                return run.finish(Outcome::failed(reason), None);
            }
        };

        if cancel.is_cancelled() {
            return run.finish(Outcome::failed(FailureReason::Cancelled), None);
        }

        // Production: snapshot, deploy, verify, restore on failure.
        touched.push(production);
        let run = match run.snapshot_production(production, &self.rollback).await {
            Ok(run) => run,
            Err((run, e)) => {
                return run.finish(
                    Outcome::failed(FailureReason::ProductionSnapshot),
                    Some(e.to_string()),
                );
            }
        };
        self.notify(PromotionState::ProductionDeploying);
        let previous = run.state().previous().cloned();

        if cancel.is_cancelled() {
            self.clear_pending(&production.environment, diagnostics).await;
            return run.finish(Outcome::failed(FailureReason::Cancelled), None);
        }

        let run = match run.deploy_production(production).await {
            Ok(run) => run,
            Err((run, e)) => {
                tracing::error!(error = %e, "production deploy failed");
                let (run, restored) = run.restore(production, &self.rollback).await;
                return recovered(
                    run,
                    FailureReason::ProductionDeploy,
                    Some(e.to_string()),
                    restored,
                );
            }
        };

        if let Err(e) = self
            .rollback
            .record_deploy(&production.environment, previous.as_ref(), run.candidate())
            .await
        {
            diagnostics.warn(Warning::record_update(e.to_string()));
        }

        match run.verify_production(production, &self.verifier, cancel).await {
            Ok(run) => {
                self.clear_pending(&production.environment, diagnostics).await;
                run.finish(Outcome::Promoted, None)
            }
            Err(run) => {
                self.notify(PromotionState::ProductionUnhealthy);
                let report = run.state().report().clone();
                let cause = match report.status {
                    HealthStatus::Cancelled => FailureReason::Cancelled,
                    _ => FailureReason::ProductionUnhealthy,
                };
                let (run, restored) = run.restore(production, &self.rollback).await;
                recovered(run, cause, failure_detail(&report), restored)
            }
        }
    }

    async fn clear_pending(&self, env: &Environment, diagnostics: &mut Diagnostics) {
        if let Err(e) = self.rollback.clear_pending(env).await {
            diagnostics.warn(Warning::record_update(e.to_string()));
        }
    }

    async fn read_back(
        &self,
        touched: &[&Target],
        diagnostics: &mut Diagnostics,
    ) -> Vec<EnvironmentStatus> {
        let mut statuses = Vec::with_capacity(touched.len());
        for target in touched {
            let running = match target.driver.current_image(&target.environment).await {
                Ok(Some(image)) => Running::Image(image),
                Ok(None) => Running::Nothing,
                Err(e) => {
                    diagnostics.warn(Warning::environment_readback(format!(
                        "could not read running image of {}: {}",
                        target.environment.name, e
                    )));
                    Running::Unknown
                }
            };
            statuses.push(EnvironmentStatus {
                name: target.environment.name.clone(),
                running,
            });
        }
        statuses
    }
}

fn failure_detail(report: &HealthReport) -> Option<String> {
    report
        .last_failure
        .as_ref()
        .map(|failure| format!("last of {} probe(s) failed: {}", report.attempts, failure))
}

/// Terminal outcome after production failed and a restore was attempted.
fn recovered<S>(
    run: Promotion<S>,
    cause: FailureReason,
    detail: Option<String>,
    restored: Result<RestoreOutcome, DeployError>,
) -> PromotionReport {
    let outcome = match restored {
        Ok(RestoreOutcome::Restored(image)) if cause != FailureReason::Cancelled => {
            Outcome::RolledBack {
                cause,
                restored: image,
            }
        }
        Ok(recovery) => Outcome::Failed {
            reason: cause,
            recovery: Some(recovery),
        },
        Err(e) => {
            tracing::error!(error = %e, "rollback failed; operator intervention required");
            Outcome::RollbackFailed {
                cause,
                error: e.to_string(),
            }
        }
    };
    run.finish(outcome, detail)
}
