// ABOUTME: Promotion state marker types for the type state pattern.
// ABOUTME: States carry the data that must exist at that point (snapshot, health report).

use crate::health::HealthReport;
use crate::types::ImageRef;

/// Nothing deployed yet.
/// Available actions: `deploy_staging()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

/// Candidate runs in staging.
/// Available actions: `verify_staging()`
#[derive(Debug, Clone, Copy, Default)]
pub struct StagingDeployed;

/// Staging verified healthy. Terminal for staging-only runs.
/// Available actions: `request_approval()`
#[derive(Debug, Clone, Copy, Default)]
pub struct StagingHealthy;

/// Waiting on the external approval signal.
/// Available actions: `await_approval()`
#[derive(Debug, Clone, Copy, Default)]
pub struct AwaitingApproval;

/// Approval granted; production not touched yet.
/// Available actions: `snapshot_production()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Approved;

/// Production snapshot captured; the candidate is about to replace it.
/// Available actions: `deploy_production()`, `restore()`
#[derive(Debug, Clone)]
pub struct ProductionDeploying {
    pub(crate) previous: Option<ImageRef>,
}

impl ProductionDeploying {
    /// Image production ran before this run touched it.
    pub fn previous(&self) -> Option<&ImageRef> {
        self.previous.as_ref()
    }
}

/// Candidate runs in production, not verified yet.
/// Available actions: `verify_production()`
#[derive(Debug, Clone)]
pub struct ProductionDeployed {
    pub(crate) previous: Option<ImageRef>,
}

/// Production verified healthy.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct ProductionHealthy {
    pub(crate) previous: Option<ImageRef>,
}

/// Production verification failed or was cancelled.
/// Available actions: `restore()`
#[derive(Debug, Clone)]
pub struct ProductionUnhealthy {
    pub(crate) previous: Option<ImageRef>,
    pub(crate) report: HealthReport,
}

impl ProductionUnhealthy {
    pub fn previous(&self) -> Option<&ImageRef> {
        self.previous.as_ref()
    }

    pub fn report(&self) -> &HealthReport {
        &self.report
    }
}
