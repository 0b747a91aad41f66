// ABOUTME: Application-wide error type for the promoter CLI.
// ABOUTME: Wraps configuration problems and the per-layer errors with thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::driver::DeployError;
use crate::promotion::{LockError, PromotionError};
use crate::remote::RemoteError;
use crate::rollback::{ManualRollbackError, RecordError};
use crate::runtime::{RuntimeError, RuntimeErrorKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown environment: {0} (expected staging or production)")]
    UnknownEnvironment(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to connect to {environment}: {source}")]
    Connect {
        environment: String,
        #[source]
        source: RuntimeError,
    },

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Rollback(#[from] ManualRollbackError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Next step for the operator, when the failure has an obvious one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound(_) => Some("run `promoter init` to create promoter.yml"),
            Error::Connect { source, .. } => match source.kind() {
                RuntimeErrorKind::NoRuntimeFound => {
                    Some("install Docker or Podman on the host, or set `runtime` and `socket`")
                }
                RuntimeErrorKind::HostUnreachable => {
                    Some("check that the host accepts SSH from this machine")
                }
                RuntimeErrorKind::ConnectionFailed => {
                    Some("check that the engine service is running and the socket is readable")
                }
            },
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ConnectError;

    #[test]
    fn connect_failures_carry_a_hint_per_kind() {
        let err = Error::Connect {
            environment: "production".to_string(),
            source: ConnectError::Ping("refused".to_string()).into(),
        };
        assert!(err.hint().unwrap().contains("engine service"));
        assert!(err.to_string().contains("production"));
    }

    #[test]
    fn plain_config_errors_have_no_hint() {
        assert_eq!(Error::InvalidConfig("bad port".to_string()).hint(), None);
        assert!(Error::ConfigNotFound(PathBuf::from("/srv")).hint().is_some());
    }
}
