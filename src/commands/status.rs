// ABOUTME: Status command implementation.
// ABOUTME: Reads what each environment runs and pairs it with the local deployment record.

use super::connect::connect;
use promoter::config::Config;
use promoter::diagnostics::Diagnostics;
use promoter::error::Result;
use promoter::output::Output;
use promoter::promotion::Running;
use promoter::rollback::{DeploymentRecord, FileRecordStore, RecordStore};
use promoter::types::EnvironmentName;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub app: String,
    pub environments: Vec<EnvironmentState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentState {
    pub name: EnvironmentName,
    pub server: String,
    pub running: Running,
    pub record: Option<DeploymentRecord>,
}

/// Show every environment. Unreachable hosts are reported, not fatal.
pub async fn status(config: Config, output: Output) -> Result<i32> {
    let store = FileRecordStore::for_app(&config.state_dir()?, &config.app);
    let mut diag = Diagnostics::default();
    let mut environments = Vec::new();

    for name in [EnvironmentName::staging(), EnvironmentName::production()] {
        let server = config.environment_config(&name)?.server.to_string();
        let record = store.load(&name).await?;

        let running = match connect(&config, &name, &output).await {
            Ok(connection) => {
                let running = match connection
                    .target
                    .driver
                    .current_image(&connection.target.environment)
                    .await
                {
                    Ok(Some(image)) => Running::Image(image),
                    Ok(None) => Running::Nothing,
                    Err(e) => {
                        output.warning(&format!("could not inspect {}: {}", name, e));
                        Running::Unknown
                    }
                };
                connection.disconnect(&mut diag).await;
                running
            }
            Err(e) => {
                output.warning(&format!("could not reach {}: {}", name, e));
                Running::Unknown
            }
        };

        environments.push(EnvironmentState {
            name,
            server,
            running,
            record,
        });
    }

    let report = StatusReport {
        app: config.app.clone(),
        environments,
        warnings: diag.into_messages(),
    };
    output.emit(&report);
    Ok(0)
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "App: {}", self.app)?;
        for env in &self.environments {
            writeln!(f, "{} ({})", env.name, env.server)?;
            writeln!(f, "  running:  {}", env.running)?;
            match &env.record {
                Some(record) => {
                    let show = |image: &Option<promoter::types::ImageRef>| {
                        image
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "none".to_string())
                    };
                    writeln!(f, "  recorded: {}", show(&record.current))?;
                    writeln!(f, "  previous: {}", show(&record.previous))?;
                    if let Some(pending) = &record.pending {
                        writeln!(
                            f,
                            "  INTERRUPTED promotion of {} since {}; run `promoter rollback {}`",
                            pending.candidate, pending.started_at, env.name
                        )?;
                    }
                }
                None => writeln!(f, "  no deployment record")?,
            }
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}
