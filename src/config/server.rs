// ABOUTME: Where an environment runs: the local engine or a host reached over SSH.
// ABOUTME: Parses "local", "host", "user@host", "host:port", "user@host:port" or a detailed map.

use crate::runtime::{EngineOverride, RuntimeType};
use crate::ssh::{HostKeyPolicy, SessionConfig};
use std::path::PathBuf;
use serde::Deserialize;

/// Keyword selecting the engine on the machine running the controller.
pub const LOCAL_SERVER: &str = "local";

/// SSH connection settings for a remote environment host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    /// Private key to authenticate with instead of the agent.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default)]
    pub runtime: Option<RuntimeType>,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    false
}

impl ServerConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err("user cannot be empty".to_string()),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port_str))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(ServerConfig {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
            identity_file: None,
            runtime: None,
            socket: None,
            trust_first_connection: default_trust_first_connection(),
        })
    }

    /// SSH user, falling back to the invoking user.
    pub fn user_or_default(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    pub fn ssh_session_config(&self) -> SessionConfig {
        let policy = if self.trust_first_connection {
            HostKeyPolicy::TrustFirstUse
        } else {
            HostKeyPolicy::Strict
        };
        let config = SessionConfig::new(&self.host, self.user_or_default())
            .with_port(self.port)
            .with_host_key_policy(policy);
        match &self.identity_file {
            Some(path) => config.with_identity(path),
            None => config,
        }
    }

    pub fn engine(&self) -> EngineOverride {
        EngineOverride {
            runtime: self.runtime,
            socket: self.socket.clone(),
        }
    }
}

/// Host an environment's container runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Server {
    /// The engine on the controller's own machine.
    Local(EngineOverride),
    /// A host reached over SSH, engine socket forwarded.
    Remote(ServerConfig),
}

impl Server {
    pub fn is_local(&self) -> bool {
        matches!(self, Server::Local(_))
    }

    /// Hostname used to build default health URLs and log lines.
    pub fn host(&self) -> &str {
        match self {
            Server::Local(_) => "localhost",
            Server::Remote(server) => &server.host,
        }
    }

    /// Engine settings that skip detection when present.
    pub fn engine(&self) -> EngineOverride {
        match self {
            Server::Local(engine) => engine.clone(),
            Server::Remote(server) => server.engine(),
        }
    }
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Server::Local(_) => write!(f, "{}", LOCAL_SERVER),
            Server::Remote(server) => match &server.user {
                Some(user) => write!(f, "{}@{}:{}", user, server.host, server.port),
                None => write!(f, "{}:{}", server.host, server.port),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum ServerEntry {
    Simple(String),
    Detailed(ServerConfig),
}

impl ServerEntry {
    pub(super) fn into_server(self) -> Result<Server, String> {
        match self {
            ServerEntry::Simple(s) if s.trim() == LOCAL_SERVER => {
                Ok(Server::Local(EngineOverride::default()))
            }
            ServerEntry::Simple(s) => ServerConfig::parse(&s).map(Server::Remote),
            ServerEntry::Detailed(c) if c.host == LOCAL_SERVER => Ok(Server::Local(c.engine())),
            ServerEntry::Detailed(c) => Ok(Server::Remote(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_only() {
        let server = ServerConfig::parse("example.com").unwrap();
        assert_eq!(server.host, "example.com");
        assert_eq!(server.port, 22);
        assert_eq!(server.user, None);
    }

    #[test]
    fn parse_user_host_port() {
        let server = ServerConfig::parse("deploy@example.com:2222").unwrap();
        assert_eq!(server.host, "example.com");
        assert_eq!(server.port, 2222);
        assert_eq!(server.user.as_deref(), Some("deploy"));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ServerConfig::parse("").is_err());
        assert!(ServerConfig::parse("@example.com").is_err());
        assert!(ServerConfig::parse("example.com:ssh").is_err());
        assert!(ServerConfig::parse("deploy@:22").is_err());
    }

    #[test]
    fn local_keyword_selects_local_engine() {
        let server = ServerEntry::Simple("local".to_string()).into_server().unwrap();
        assert!(server.is_local());
        assert_eq!(server.host(), "localhost");
        assert_eq!(server.to_string(), "local");
    }

    #[test]
    fn detailed_local_keeps_engine_overrides() {
        let yaml = "host: local\nruntime: podman\nsocket: /tmp/podman.sock\n";
        let entry: ServerEntry = serde_yaml::from_str(yaml).unwrap();
        let server = entry.into_server().unwrap();

        let runtime = server.engine();
        assert_eq!(runtime.runtime, Some(RuntimeType::Podman));
        assert_eq!(runtime.socket.as_deref(), Some("/tmp/podman.sock"));
    }

    #[test]
    fn remote_display_includes_user_and_port() {
        let server = ServerEntry::Simple("deploy@prod.example.com".to_string())
            .into_server()
            .unwrap();
        assert_eq!(server.to_string(), "deploy@prod.example.com:22");
    }

    #[test]
    fn session_config_carries_identity_and_host_key_policy() {
        let yaml = "host: prod.example.com\nuser: deploy\nport: 2200\nidentity_file: /keys/deploy\ntrust_first_connection: true\n";
        let server: ServerConfig = serde_yaml::from_str(yaml).unwrap();

        let session = server.ssh_session_config();
        assert_eq!(session.address(), "deploy@prod.example.com:2200");
        assert_eq!(session.identity, Some(PathBuf::from("/keys/deploy")));
        assert_eq!(session.host_keys, HostKeyPolicy::TrustFirstUse);

        let strict = ServerConfig::parse("deploy@prod.example.com").unwrap();
        assert_eq!(strict.ssh_session_config().host_keys, HostKeyPolicy::Strict);
    }
}
