// ABOUTME: SSH client for reaching remote environment hosts.
// ABOUTME: Agent and key-file authentication with known_hosts verification.

mod auth;
mod config;
mod error;
mod forward;
mod host_keys;
mod session;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use host_keys::HostKeyPolicy;
pub use session::Session;
