// ABOUTME: Server host key verification against known_hosts.
// ABOUTME: Strict by default; trust-on-first-use learns unknown keys but never accepts a changed one.

use parking_lot::Mutex;
use russh::client;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::PublicKey;
use std::path::PathBuf;
use std::sync::Arc;

/// What to do with a host whose key is not in known_hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Refuse unknown hosts.
    #[default]
    Strict,
    /// Accept and record the key of an unknown host.
    TrustFirstUse,
}

/// Result of looking a key up in known_hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Known,
    Unknown,
    Changed,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Accept,
    AcceptAndLearn,
    Reject(String),
}

fn decide(policy: HostKeyPolicy, lookup: Lookup, host: &str) -> Decision {
    match (lookup, policy) {
        (Lookup::Known, _) => Decision::Accept,
        (Lookup::Changed, _) => Decision::Reject(format!(
            "host key for {host} does not match known_hosts; refusing to connect"
        )),
        (Lookup::Unknown, HostKeyPolicy::TrustFirstUse) => Decision::AcceptAndLearn,
        (Lookup::Unknown, HostKeyPolicy::Strict) => Decision::Reject(format!(
            "host key for {host} is not in known_hosts; add it or set trust_first_connection"
        )),
        (Lookup::Unreadable(_), HostKeyPolicy::TrustFirstUse) => Decision::Accept,
        (Lookup::Unreadable(reason), HostKeyPolicy::Strict) => {
            Decision::Reject(format!("cannot verify host key for {host}: {reason}"))
        }
    }
}

/// russh handler that checks the server key during the handshake.
///
/// A rejection reason is left in `rejection` so the connect error can say
/// why the handshake was aborted.
pub(crate) struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
    rejection: Arc<Mutex<Option<String>>>,
}

impl HostKeyVerifier {
    pub(super) fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts: Option<PathBuf>,
    ) -> (Self, Arc<Mutex<Option<String>>>) {
        let rejection = Arc::new(Mutex::new(None));
        let verifier = Self {
            host,
            port,
            policy,
            known_hosts,
            rejection: Arc::clone(&rejection),
        };
        (verifier, rejection)
    }

    fn lookup(&self, key: &PublicKey) -> Lookup {
        let result = match &self.known_hosts {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        };
        match result {
            Ok(true) => Lookup::Known,
            Ok(false) => Lookup::Unknown,
            Err(russh::keys::Error::KeyChanged { .. }) => Lookup::Changed,
            Err(e) => Lookup::Unreadable(e.to_string()),
        }
    }

    fn learn(&self, key: &PublicKey) {
        let result = match &self.known_hosts {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = result {
            tracing::warn!(host = %self.host, error = %e, "failed to record host key");
        }
    }
}

impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        match decide(self.policy, self.lookup(key), &self.host) {
            Decision::Accept => Ok(true),
            Decision::AcceptAndLearn => {
                tracing::warn!(host = %self.host, port = self.port, "trusting host key on first use");
                self.learn(key);
                Ok(true)
            }
            Decision::Reject(reason) => {
                *self.rejection.lock() = Some(reason);
                Ok(false)
            }
        }
    }
}
