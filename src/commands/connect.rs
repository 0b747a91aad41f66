// ABOUTME: Shared helper for reaching an environment's host and container engine.
// ABOUTME: Local engines are used directly; remote ones through an SSH session and forwarded socket.

use promoter::config::{Config, Server};
use promoter::diagnostics::{Diagnostics, Warning};
use promoter::driver::ContainerDriver;
use promoter::environment::HealthSource;
use promoter::error::{Error, Result};
use promoter::health::{HostProbe, HttpProbe, Probe};
use promoter::output::Output;
use promoter::promotion::Target;
use promoter::remote::{CommandRunner, LocalShell};
use promoter::runtime::{
    BollardRuntime, EngineOverride, RuntimeError, connect_local, connect_via_session, detect_local,
    detect_runtime,
};
use promoter::ssh::Session;
use promoter::types::EnvironmentName;
use std::sync::Arc;

/// An environment's target plus the channel used to reach its host.
pub struct Connection {
    pub target: Target,
    pub runner: Arc<dyn CommandRunner>,
    session: Option<Arc<Session>>,
}

impl Connection {
    pub fn name(&self) -> &EnvironmentName {
        &self.target.environment.name
    }

    /// Close the SSH session, if any. Failure is only a warning.
    pub async fn disconnect(self, diag: &mut Diagnostics) {
        if let Some(session) = self.session
            && let Err(e) = session.disconnect().await
        {
            diag.warn(Warning::ssh_disconnect(format!(
                "SSH disconnect failed for {}: {}",
                session.host(),
                e
            )));
        }
    }
}

/// Connect to the host and engine of environment `name`.
pub async fn connect(config: &Config, name: &EnvironmentName, output: &Output) -> Result<Connection> {
    let environment = config.environment(name)?;
    let server = &config.environment_config(name)?.server;
    let connect_err = |source: RuntimeError| Error::Connect {
        environment: name.to_string(),
        source,
    };

    output.progress(&format!("  → Connecting to {} ({})...", name, server));

    let (runner, session, runtime) = match server {
        Server::Local(engine) => {
            let info = detect_local(Some(engine)).map_err(|e| connect_err(e.into()))?;
            output.progress(&format!(
                "  → Found {} at {}",
                info.runtime_type, info.socket_path
            ));
            let runtime = connect_local(&info)
                .await
                .map_err(|e| connect_err(e.into()))?;
            let runner: Arc<dyn CommandRunner> = Arc::new(LocalShell);
            (runner, None, runtime)
        }
        Server::Remote(remote) => {
            let session = Arc::new(Session::connect(remote.ssh_session_config()).await?);
            let runtime = match remote_engine(&session, &remote.engine(), output).await {
                Ok(runtime) => runtime,
                Err(e) => {
                    if let Err(disconnect) = session.disconnect().await {
                        tracing::warn!(error = %disconnect, "SSH disconnect failed");
                    }
                    return Err(connect_err(e));
                }
            };
            let runner: Arc<dyn CommandRunner> = session.clone();
            (runner, Some(session), runtime)
        }
    };

    let probe: Arc<dyn Probe> = match environment.health_source {
        HealthSource::Controller => Arc::new(HttpProbe::new()),
        HealthSource::Host => Arc::new(
            HostProbe::new(Arc::clone(&runner)).with_max_time(config.health.timeout),
        ),
    };

    let driver = Arc::new(ContainerDriver::new(runtime));
    Ok(Connection {
        target: Target::new(environment, driver, probe),
        runner,
        session,
    })
}

async fn remote_engine(
    session: &Session,
    engine: &EngineOverride,
    output: &Output,
) -> std::result::Result<BollardRuntime, RuntimeError> {
    output.progress("  → Detecting runtime...");
    let info = detect_runtime(session, Some(engine)).await?;
    output.progress(&format!(
        "  → Found {} at {}",
        info.runtime_type, info.socket_path
    ));
    Ok(connect_via_session(session, &info).await?)
}

/// Disconnect every connection, collecting warnings.
pub async fn disconnect_all(connections: Vec<Connection>, diag: &mut Diagnostics) {
    for connection in connections {
        connection.disconnect(diag).await;
    }
}
