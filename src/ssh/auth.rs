// ABOUTME: Public key authentication for SSH sessions.
// ABOUTME: Tries an explicit identity file, then the SSH agent, then the default keys in ~/.ssh.

use russh::client::Handle;
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key::PrivateKey;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixStream;

use super::error::{Error, Result};
use super::host_keys::HostKeyVerifier;

/// Key files tried, in order, when neither an identity nor an agent is available.
const DEFAULT_KEYS: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// Where the signing key comes from.
pub(super) enum Credentials {
    Agent(AgentClient<UnixStream>),
    Key(Arc<PrivateKey>),
}

impl Credentials {
    pub(super) async fn resolve(identity: Option<&Path>) -> Result<Self> {
        if let Some(path) = identity {
            return load(path).map(Credentials::Key);
        }

        match AgentClient::connect_env().await {
            Ok(agent) => return Ok(Credentials::Agent(agent)),
            Err(e) => tracing::debug!(error = %e, "SSH agent unavailable; trying default keys"),
        }

        let ssh_dir = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".ssh"))
            .ok_or_else(|| Error::AgentUnavailable("no agent and HOME is not set".to_string()))?;

        DEFAULT_KEYS
            .iter()
            .map(|name| ssh_dir.join(name))
            .filter(|path| path.exists())
            .find_map(|path| load(&path).ok())
            .map(Credentials::Key)
            .ok_or_else(|| {
                Error::AgentUnavailable(format!(
                    "no agent and no usable key in {}",
                    ssh_dir.display()
                ))
            })
    }

    /// Offer the credentials for `user`. `Ok(false)` means the server said no.
    pub(super) async fn authenticate(
        self,
        handle: &mut Handle<HostKeyVerifier>,
        user: &str,
    ) -> Result<bool> {
        match self {
            Credentials::Key(key) => {
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash))
                    .await?;
                Ok(result.success())
            }
            Credentials::Agent(mut agent) => {
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(|e| Error::AgentUnavailable(e.to_string()))?;
                if identities.is_empty() {
                    return Err(Error::AgentUnavailable("agent holds no keys".to_string()));
                }

                for identity in identities {
                    let result = handle
                        .authenticate_publickey_with(user, identity, None, &mut agent)
                        .await;
                    if matches!(result, Ok(ref r) if r.success()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn load(path: &Path) -> Result<Arc<PrivateKey>> {
    load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| Error::KeyLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
