// ABOUTME: Health verification by bounded polling with a fixed interval.
// ABOUTME: First successful probe wins; exhaustion reports unhealthy; cancellable between attempts.

mod probe;

pub use probe::{HostProbe, HttpProbe, Probe, ProbeFailure, ProbeResult};

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::cancel::CancelToken;

/// Polling bounds for one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Total probe attempts, at least one.
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub interval: Duration,
    /// Upper bound on a single probe.
    pub probe_timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl HealthPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            ..Default::default()
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Cancelled,
}

/// Result of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Probes actually issued.
    pub attempts: u32,
    #[serde(serialize_with = "display_opt")]
    pub last_failure: Option<ProbeFailure>,
}

fn display_opt<S: Serializer>(value: &Option<ProbeFailure>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(failure) => s.serialize_some(&failure.to_string()),
        None => s.serialize_none(),
    }
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    fn cancelled(attempts: u32, last_failure: Option<ProbeFailure>) -> Self {
        Self {
            status: HealthStatus::Cancelled,
            attempts,
            last_failure,
        }
    }
}

/// Polls a health URL according to a [`HealthPolicy`].
#[derive(Debug, Clone, Default)]
pub struct HealthVerifier {
    policy: HealthPolicy,
}

impl HealthVerifier {
    pub fn new(policy: HealthPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Probe `url` until one attempt succeeds or `max_attempts` have failed.
    ///
    /// Worst-case latency is `max_attempts * interval` plus probe time; there
    /// is no wait after the final attempt.
    pub async fn verify(&self, probe: &dyn Probe, url: &str, cancel: &CancelToken) -> HealthReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return HealthReport::cancelled(attempt - 1, last_failure);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return HealthReport::cancelled(attempt - 1, last_failure);
                }
                r = tokio::time::timeout(self.policy.probe_timeout, probe.probe(url)) => r,
            };

            let failure = match result {
                Ok(ProbeResult::Success(status)) => {
                    tracing::debug!(url, attempt, status, "health probe succeeded");
                    return HealthReport {
                        status: HealthStatus::Healthy,
                        attempts: attempt,
                        last_failure: None,
                    };
                }
                Ok(ProbeResult::Failure(failure)) => failure,
                Err(_) => ProbeFailure::Timeout,
            };

            tracing::debug!(
                url,
                attempt,
                max_attempts,
                failure = %failure,
                "health probe failed"
            );
            last_failure = Some(failure);

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return HealthReport::cancelled(attempt, last_failure);
                    }
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
        }

        tracing::warn!(url, attempts = max_attempts, "health verification exhausted");
        HealthReport {
            status: HealthStatus::Unhealthy,
            attempts: max_attempts,
            last_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails until `succeed_on`, counting calls.
    struct Countdown {
        succeed_on: Option<u32>,
        calls: AtomicU32,
    }

    impl Countdown {
        fn new(succeed_on: Option<u32>) -> Self {
            Self {
                succeed_on,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for Countdown {
        async fn probe(&self, _url: &str) -> ProbeResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.succeed_on {
                ProbeResult::Success(200)
            } else {
                ProbeResult::Failure(ProbeFailure::Status(503))
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl Probe for Hangs {
        async fn probe(&self, _url: &str) -> ProbeResult {
            std::future::pending().await
        }
    }

    #[test]
    fn default_policy_is_thirty_by_three_seconds() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(3));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(HealthPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_intervals() {
        let verifier = HealthVerifier::new(HealthPolicy::new(5, Duration::from_secs(2)));
        let probe = Countdown::new(Some(3));
        let start = tokio::time::Instant::now();

        let report = verifier
            .verify(&probe, "http://app/health", &CancelToken::never())
            .await;

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_counts_as_timeout() {
        let verifier = HealthVerifier::new(
            HealthPolicy::new(2, Duration::from_secs(1)).with_probe_timeout(Duration::from_secs(5)),
        );

        let report = verifier
            .verify(&Hangs, "http://app/health", &CancelToken::never())
            .await;

        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.last_failure, Some(ProbeFailure::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_stops_polling() {
        let verifier = HealthVerifier::new(HealthPolicy::new(30, Duration::from_secs(3)));
        let probe = Countdown::new(None);
        let (canceller, token) = cancellation();

        let run = verifier.verify(&probe, "http://app/health", &token);
        let cancel_later = async {
            tokio::time::sleep(Duration::from_secs(4)).await;
            canceller.cancel();
        };
        let (report, ()) = tokio::join!(run, cancel_later);

        assert_eq!(report.status, HealthStatus::Cancelled);
        assert_eq!(report.attempts, 2);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn already_cancelled_token_issues_no_probe() {
        let verifier = HealthVerifier::default();
        let probe = Countdown::new(Some(1));
        let (canceller, token) = cancellation();
        canceller.cancel();

        let report = verifier.verify(&probe, "http://app/health", &token).await;

        assert_eq!(report.status, HealthStatus::Cancelled);
        assert_eq!(report.attempts, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
