// ABOUTME: Connection settings for an SSH session to an environment host.
// ABOUTME: Host, credentials, host key policy, and command/connect timeouts.

use std::path::PathBuf;
use std::time::Duration;

use super::host_keys::HostKeyPolicy;

/// Settings for [`Session::connect`](super::Session::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key to authenticate with. Without one the agent is tried,
    /// then the default keys under `~/.ssh`.
    pub identity: Option<PathBuf>,
    pub host_keys: HostKeyPolicy,
    /// known_hosts file to verify against; `~/.ssh/known_hosts` if unset.
    pub known_hosts: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Upper bound on a single remote command.
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            identity: None,
            host_keys: HostKeyPolicy::Strict,
            known_hosts: None,
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(path.into());
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_keys = policy;
        self
    }

    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// `user@host:port`, for messages.
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict_on_port_22() {
        let config = SessionConfig::new("prod.example.com", "deploy");
        assert_eq!(config.port, 22);
        assert_eq!(config.host_keys, HostKeyPolicy::Strict);
        assert_eq!(config.identity, None);
        assert_eq!(config.address(), "deploy@prod.example.com:22");
    }

    #[test]
    fn builders_override_defaults() {
        let config = SessionConfig::new("prod.example.com", "deploy")
            .with_port(2222)
            .with_identity("/keys/deploy")
            .with_host_key_policy(HostKeyPolicy::TrustFirstUse)
            .with_known_hosts("/etc/promoter/known_hosts")
            .with_command_timeout(Duration::from_secs(5));

        assert_eq!(config.port, 2222);
        assert_eq!(config.identity, Some(PathBuf::from("/keys/deploy")));
        assert_eq!(config.host_keys, HostKeyPolicy::TrustFirstUse);
        assert_eq!(
            config.known_hosts,
            Some(PathBuf::from("/etc/promoter/known_hosts"))
        );
        assert_eq!(config.command_timeout, Duration::from_secs(5));
    }
}
