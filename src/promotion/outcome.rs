// ABOUTME: Reported states, terminal outcomes, and the report of a promotion run.
// ABOUTME: The report says which image each touched environment runs after the run.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::health::HealthReport;
use crate::rollback::RestoreOutcome;
use crate::types::{EnvironmentName, ImageRef};

/// How far a promotion should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Stop after staging is healthy.
    Staging,
    /// Continue through approval into production.
    Production,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Staging => write!(f, "staging"),
            Destination::Production => write!(f, "production"),
        }
    }
}

/// States a run passes through, in the order they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionState {
    Idle,
    StagingDeployed,
    StagingHealthy,
    AwaitingApproval,
    ProductionDeploying,
    ProductionHealthy,
    ProductionUnhealthy,
    RolledBack,
    RollbackFailed,
    Failed,
}

impl PromotionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PromotionState::ProductionHealthy
                | PromotionState::RolledBack
                | PromotionState::RollbackFailed
                | PromotionState::Failed
        )
    }
}

impl fmt::Display for PromotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromotionState::Idle => "idle",
            PromotionState::StagingDeployed => "staging deployed",
            PromotionState::StagingHealthy => "staging healthy",
            PromotionState::AwaitingApproval => "awaiting approval",
            PromotionState::ProductionDeploying => "production deploying",
            PromotionState::ProductionHealthy => "production healthy",
            PromotionState::ProductionUnhealthy => "production unhealthy",
            PromotionState::RolledBack => "rolled back",
            PromotionState::RollbackFailed => "rollback failed",
            PromotionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run did not promote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    StagingDeploy,
    StagingUnhealthy,
    ApprovalTimeout,
    ApprovalRejected,
    Cancelled,
    ProductionSnapshot,
    ProductionDeploy,
    ProductionUnhealthy,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::StagingDeploy => "staging deploy failed",
            FailureReason::StagingUnhealthy => "staging health verification failed",
            FailureReason::ApprovalTimeout => "approval timed out",
            FailureReason::ApprovalRejected => "approval rejected",
            FailureReason::Cancelled => "cancelled",
            FailureReason::ProductionSnapshot => "could not snapshot production",
            FailureReason::ProductionDeploy => "production deploy failed",
            FailureReason::ProductionUnhealthy => "production health verification failed",
        };
        f.write_str(text)
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// Production runs the candidate and is healthy.
    Promoted,
    /// Staging-only run: staging runs the candidate and is healthy.
    Staged,
    /// Not promoted and not restored to a previous image.
    Failed {
        reason: FailureReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        recovery: Option<RestoreOutcome>,
    },
    /// Production failed and the previous image runs again.
    RolledBack {
        cause: FailureReason,
        restored: ImageRef,
    },
    /// Production failed and could not be restored. Needs an operator.
    RollbackFailed { cause: FailureReason, error: String },
}

impl Outcome {
    pub fn failed(reason: FailureReason) -> Self {
        Outcome::Failed {
            reason,
            recovery: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Promoted | Outcome::Staged)
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Promoted | Outcome::Staged => 0,
            Outcome::Failed { .. } => 1,
            Outcome::RolledBack { .. } => 2,
            Outcome::RollbackFailed { .. } => 3,
        }
    }

    /// Terminal state matching this outcome.
    pub fn terminal_state(&self) -> PromotionState {
        match self {
            Outcome::Promoted => PromotionState::ProductionHealthy,
            Outcome::Staged => PromotionState::StagingHealthy,
            Outcome::Failed { .. } => PromotionState::Failed,
            Outcome::RolledBack { .. } => PromotionState::RolledBack,
            Outcome::RollbackFailed { .. } => PromotionState::RollbackFailed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Promoted => write!(f, "promoted to production"),
            Outcome::Staged => write!(f, "staged"),
            Outcome::Failed {
                reason,
                recovery: Some(RestoreOutcome::NoPriorImage),
            } => write!(f, "failed: {reason} (no prior image to restore)"),
            Outcome::Failed {
                reason,
                recovery: Some(RestoreOutcome::Restored(image)),
            } => write!(f, "failed: {reason} (restored {image})"),
            Outcome::Failed {
                reason,
                recovery: None,
            } => write!(f, "failed: {reason}"),
            Outcome::RolledBack { cause, restored } => {
                write!(f, "rolled back to {restored}: {cause}")
            }
            Outcome::RollbackFailed { cause, error } => {
                write!(f, "ROLLBACK FAILED after {cause}: {error}")
            }
        }
    }
}

/// What an environment runs after the run, as read back from its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Running {
    Image(ImageRef),
    Nothing,
    /// The host could not be queried.
    Unknown,
}

impl fmt::Display for Running {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Running::Image(image) => write!(f, "{image}"),
            Running::Nothing => write!(f, "nothing"),
            Running::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for Running {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Running::Image(image) => s.serialize_some(&image.to_string()),
            Running::Nothing => s.serialize_none(),
            Running::Unknown => s.serialize_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentStatus {
    pub name: EnvironmentName,
    pub running: Running,
}

/// One health verification performed during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub environment: EnvironmentName,
    pub url: String,
    #[serde(flatten)]
    pub report: HealthReport,
}

/// Everything an operator needs to know about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub candidate: ImageRef,
    pub destination: Destination,
    /// States in the order they were entered, ending in a terminal one.
    pub states: Vec<PromotionState>,
    pub outcome: Outcome,
    /// Underlying error or last probe failure behind a failed outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub health_checks: Vec<HealthCheck>,
    /// Every environment the run touched, read back after the run.
    pub environments: Vec<EnvironmentStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PromotionReport {
    pub fn final_state(&self) -> PromotionState {
        self.states
            .last()
            .copied()
            .unwrap_or(PromotionState::Idle)
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn running_in(&self, env: &EnvironmentName) -> Option<&Running> {
        self.environments
            .iter()
            .find(|e| &e.name == env)
            .map(|e| &e.running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_failure_kinds() {
        let image = ImageRef::parse("r.io/app:old1").unwrap();
        assert_eq!(Outcome::Promoted.exit_code(), 0);
        assert_eq!(Outcome::Staged.exit_code(), 0);
        assert_eq!(Outcome::failed(FailureReason::ApprovalTimeout).exit_code(), 1);
        assert_eq!(
            Outcome::RolledBack {
                cause: FailureReason::ProductionUnhealthy,
                restored: image,
            }
            .exit_code(),
            2
        );
        assert_eq!(
            Outcome::RollbackFailed {
                cause: FailureReason::ProductionUnhealthy,
                error: "registry unreachable".into(),
            }
            .exit_code(),
            3
        );
    }

    #[test]
    fn outcome_serializes_with_result_tag() {
        let outcome = Outcome::Failed {
            reason: FailureReason::ProductionUnhealthy,
            recovery: Some(RestoreOutcome::NoPriorImage),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["reason"], "production_unhealthy");
        assert_eq!(json["recovery"]["kind"], "no_prior_image");
    }

    #[test]
    fn running_serializes_image_as_string() {
        let status = EnvironmentStatus {
            name: EnvironmentName::production(),
            running: Running::Image(ImageRef::parse("r.io/app:abc123").unwrap()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], "r.io/app:abc123");
        assert_eq!(json["name"], "production");
    }
}
