// ABOUTME: Promotion controller built on the type state pattern.
// ABOUTME: Exports state markers, the run type, the controller, approval gate, and locks.

mod approval;
mod controller;
mod error;
mod lock;
mod outcome;
mod run;
mod state;
mod transitions;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalHandle, ApprovalOutcome, spawn_file_source,
    spawn_stdin_prompt,
};
pub use controller::{
    DEFAULT_APPROVAL_TIMEOUT, PromotionController, PromotionRequest, StateObserver, Target,
};
pub use error::PromotionError;
pub use lock::{DeployLock, EnvironmentGuard, EnvironmentLocks, LockError, LockInfo};
pub use outcome::{
    Destination, EnvironmentStatus, FailureReason, HealthCheck, Outcome, PromotionReport,
    PromotionState, Running,
};
pub use run::Promotion;
pub use state::{
    Approved, AwaitingApproval, Idle, ProductionDeployed, ProductionDeploying, ProductionHealthy,
    ProductionUnhealthy, StagingDeployed, StagingHealthy,
};
pub use transitions::TransitionResult;
