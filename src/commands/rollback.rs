// ABOUTME: Rollback command implementation.
// ABOUTME: Restores an environment's previous image from its deployment record.

use super::connect::connect;
use promoter::config::Config;
use promoter::diagnostics::{Diagnostics, Warning};
use promoter::error::Result;
use promoter::output::Output;
use promoter::promotion::DeployLock;
use promoter::rollback::{
    FileRecordStore, RecordStore, RestoreOutcome, RollbackManager, RollbackPlan,
};
use promoter::types::{EnvironmentName, ImageRef};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct RollbackSummary {
    pub environment: EnvironmentName,
    /// Image the record said was running before the rollback.
    pub replaced: Option<ImageRef>,
    pub outcome: RestoreOutcome,
    /// Whether the environment was touched.
    pub changed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Undo the last recorded change to `name`.
///
/// Restores the previous image, or clears an interrupted first deploy.
/// With nothing to undo the environment is left untouched and the command
/// exits non-zero.
pub async fn rollback(
    config: Config,
    name: EnvironmentName,
    force: bool,
    mut output: Output,
) -> Result<i32> {
    config.environment_config(&name)?;
    output.start_timer();

    let store = Arc::new(FileRecordStore::for_app(&config.state_dir()?, &config.app));
    let record = store.load_or_new(&name).await?;
    let replaced = match &record.pending {
        Some(pending) => Some(pending.candidate.clone()),
        None => record.current.clone(),
    };
    let unchanged = |replaced| RollbackSummary {
        environment: name.clone(),
        replaced,
        outcome: RestoreOutcome::NoPriorImage,
        changed: false,
        warnings: Vec::new(),
    };

    match record.rollback_plan() {
        None => {
            output.emit(&unchanged(replaced));
            return Ok(1);
        }
        Some(RollbackPlan::Restore(target)) => {
            output.progress(&format!("Rolling back {} on {} to {}", config.app, name, target))
        }
        Some(RollbackPlan::Clear) => output.progress(&format!(
            "Removing interrupted first deploy of {} on {}",
            config.app, name
        )),
    }

    let mut diag = Diagnostics::default();
    let connection = connect(&config, &name, &output).await?;

    let result: Result<Option<RestoreOutcome>> =
        match DeployLock::acquire(connection.runner.as_ref(), &config.app, &name, force).await {
            Ok(lock) => {
                output.progress("  → Restoring previous state...");
                let manager = RollbackManager::new(store.clone());
                let result = manager
                    .rollback(connection.target.driver.as_ref(), &connection.target.environment)
                    .await;
                if let Err(e) = lock.release().await {
                    diag.warn(Warning::lock_release(e.to_string()));
                }
                result.map_err(Into::into)
            }
            Err(e) => Err(e.into()),
        };

    connection.disconnect(&mut diag).await;

    // Another run may have settled the record while we connected.
    let Some(outcome) = result? else {
        output.emit(&unchanged(replaced));
        return Ok(1);
    };

    let summary = RollbackSummary {
        environment: name,
        replaced,
        outcome,
        changed: true,
        warnings: diag.into_messages(),
    };
    output.emit(&summary);
    Ok(0)
}

impl fmt::Display for RollbackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RestoreOutcome::Restored(image) => {
                writeln!(f, "{}: rolled back to {}", self.environment, image)?
            }
            RestoreOutcome::NoPriorImage if self.changed => writeln!(
                f,
                "{}: no previous image; environment left empty",
                self.environment
            )?,
            RestoreOutcome::NoPriorImage => writeln!(
                f,
                "{}: no previous image recorded; nothing changed",
                self.environment
            )?,
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}
