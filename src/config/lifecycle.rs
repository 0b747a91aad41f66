// ABOUTME: How deployed containers are restarted and stopped by the engine.
// ABOUTME: `restart:` accepts no, always or unless-stopped; `stop.timeout` bounds graceful shutdown.

use serde::Deserialize;
use serde::de::{self, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::RestartPolicyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    const ALL: [RestartPolicy; 3] = [
        RestartPolicy::No,
        RestartPolicy::Always,
        RestartPolicy::UnlessStopped,
    ];

    fn as_str(self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == s)
            .ok_or_else(|| {
                format!("unknown restart policy: {s} (expected no, always or unless-stopped)")
            })
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RestartPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl From<RestartPolicy> for RestartPolicyConfig {
    fn from(policy: RestartPolicy) -> Self {
        match policy {
            RestartPolicy::No => RestartPolicyConfig::No,
            RestartPolicy::Always => RestartPolicyConfig::Always,
            RestartPolicy::UnlessStopped => RestartPolicyConfig::UnlessStopped,
        }
    }
}

/// Grace period a replaced container gets between SIGTERM and SIGKILL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StopConfig {
    #[serde(default = "StopConfig::default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl StopConfig {
    fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_policies() {
        assert_eq!("no".parse::<RestartPolicy>().unwrap(), RestartPolicy::No);
        assert_eq!(
            "unless-stopped".parse::<RestartPolicy>().unwrap(),
            RestartPolicy::UnlessStopped
        );
        assert!("on-failure".parse::<RestartPolicy>().is_err());
    }

    #[test]
    fn display_matches_config_spelling() {
        for policy in RestartPolicy::ALL {
            assert_eq!(policy.to_string().parse::<RestartPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn stop_timeout_defaults_to_ten_seconds() {
        let stop: StopConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(stop, StopConfig::default());
        assert_eq!(stop.timeout, Duration::from_secs(10));

        let stop: StopConfig = serde_yaml::from_str("timeout: 45s").unwrap();
        assert_eq!(stop.timeout, Duration::from_secs(45));
    }
}
