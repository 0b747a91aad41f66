// ABOUTME: Health verification and approval gate settings.
// ABOUTME: Durations use humantime strings such as "3s" or "30m".

use serde::Deserialize;
use std::time::Duration;

use crate::health::HealthPolicy;
use crate::promotion::DEFAULT_APPROVAL_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_attempts() -> u32 {
    30
}

fn default_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            attempts: default_attempts(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

impl HealthConfig {
    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy::new(self.attempts, self.interval).with_probe_timeout(self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approval_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_approval_timeout() -> Duration {
    DEFAULT_APPROVAL_TIMEOUT
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        ApprovalConfig {
            timeout: default_approval_timeout(),
        }
    }
}
