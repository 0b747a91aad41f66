// ABOUTME: Promote command implementation.
// ABOUTME: Connects both environments, takes deploy locks, runs the controller, and prints the report.

use super::connect::{Connection, connect, disconnect_all};
use promoter::cancel::CancelToken;
use promoter::config::{Config, Overrides};
use promoter::diagnostics::{Diagnostics, Warning};
use promoter::error::Result;
use promoter::output::Output;
use promoter::promotion::{
    ApprovalGate, DeployLock, Destination, PromotionController, PromotionRequest,
    spawn_file_source, spawn_stdin_prompt,
};
use promoter::rollback::{FileRecordStore, RollbackManager};
use promoter::types::{EnvironmentName, ImageRef};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often a decision file is checked.
const APPROVAL_FILE_POLL: Duration = Duration::from_secs(1);

/// Options of `promoter promote`.
#[derive(Debug, Clone)]
pub struct PromoteOptions {
    pub tag: Option<String>,
    pub image: Option<ImageRef>,
    pub destination: Destination,
    pub approve: bool,
    pub approval_file: Option<PathBuf>,
    pub overrides: Overrides,
    pub force: bool,
}

/// Run one promotion and return the process exit code.
pub async fn promote(
    mut config: Config,
    options: PromoteOptions,
    mut output: Output,
    cancel: CancelToken,
) -> Result<i32> {
    config.apply_overrides(&options.overrides)?;
    let candidate = config.candidate(options.tag.as_deref(), options.image.as_ref())?;

    output.start_timer();
    output.progress(&format!(
        "Promoting {} ({}) to {}",
        config.app, candidate, options.destination
    ));

    let mut diag = Diagnostics::default();
    let mut names = vec![EnvironmentName::staging()];
    if options.destination == Destination::Production {
        names.push(EnvironmentName::production());
    }

    let mut connections = Vec::with_capacity(names.len());
    for name in &names {
        match connect(&config, name, &output).await {
            Ok(connection) => connections.push(connection),
            Err(e) => {
                disconnect_all(connections, &mut diag).await;
                return Err(e);
            }
        }
    }

    let result = with_deploy_locks(&config, &connections, options.force, &mut diag, async {
        run_controller(&config, &connections, candidate, &options, &output, &cancel).await
    })
    .await;

    disconnect_all(connections, &mut diag).await;

    let mut report = result?;
    report.warnings.extend(diag.into_messages());
    for warning in &report.warnings {
        output.warning(warning);
    }
    output.report(&report);
    Ok(report.exit_code())
}

async fn run_controller(
    config: &Config,
    connections: &[Connection],
    candidate: ImageRef,
    options: &PromoteOptions,
    output: &Output,
    cancel: &CancelToken,
) -> Result<promoter::promotion::PromotionReport> {
    let staging = connections[0].target.clone();
    // A staging-only run never touches production; the staging target stands in.
    let production = connections
        .get(1)
        .map(|c| c.target.clone())
        .unwrap_or_else(|| staging.clone());

    let store = FileRecordStore::for_app(&config.state_dir()?, &config.app);
    let rollback = RollbackManager::new(Arc::new(store));

    let observer = output.clone();
    let controller = PromotionController::new(staging, production, rollback)
        .with_health_policy(config.health.policy())
        .with_approval_timeout(config.approval.timeout)
        .on_state(move |state| observer.state(state));

    let request = PromotionRequest {
        candidate,
        destination: options.destination,
    };
    let (gate, source) = approval_gate(options, &request.candidate);

    let result = controller.run(request, gate, cancel).await;
    if let Some(source) = source {
        source.abort();
    }
    Ok(result?)
}

/// Gate plus the task feeding it, if any.
fn approval_gate(
    options: &PromoteOptions,
    candidate: &ImageRef,
) -> (ApprovalGate, Option<JoinHandle<()>>) {
    if options.approve || options.destination == Destination::Staging {
        return (ApprovalGate::pre_approved(), None);
    }

    let (handle, gate) = ApprovalGate::channel();
    let source = match &options.approval_file {
        Some(path) => spawn_file_source(path.clone(), APPROVAL_FILE_POLL, handle),
        None => spawn_stdin_prompt(format!("Promote {} to production?", candidate), handle),
    };
    (gate, Some(source))
}

/// Hold each environment's deploy lock around `work`, releasing them afterwards.
async fn with_deploy_locks<T>(
    config: &Config,
    connections: &[Connection],
    force: bool,
    diag: &mut Diagnostics,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let mut locks = Vec::with_capacity(connections.len());
    for connection in connections {
        match DeployLock::acquire(connection.runner.as_ref(), &config.app, connection.name(), force)
            .await
        {
            Ok(lock) => locks.push(lock),
            Err(e) => {
                release_all(locks, diag).await;
                return Err(e.into());
            }
        }
    }

    let result = work.await;
    release_all(locks, diag).await;
    result
}

async fn release_all(locks: Vec<DeployLock<'_>>, diag: &mut Diagnostics) {
    for lock in locks {
        if let Err(e) = lock.release().await {
            diag.warn(Warning::lock_release(e.to_string()));
        }
    }
}
