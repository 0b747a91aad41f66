// ABOUTME: Approval gate: a cancellable, time-bounded wait on an external decision.
// ABOUTME: The handle side is fed by the CLI (flag, decision file, or interactive prompt).

use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    /// Parse a decision word as written to a decision file or typed at a prompt.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" | "yes" | "y" => Some(ApprovalDecision::Approve),
            "reject" | "rejected" | "no" | "n" => Some(ApprovalDecision::Reject),
            _ => None,
        }
    }
}

/// How waiting at the gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    TimedOut,
    Cancelled,
}

/// Sends the decision into an [`ApprovalGate`]. Only the first decision counts.
#[derive(Debug)]
pub struct ApprovalHandle {
    decision: watch::Sender<Option<ApprovalDecision>>,
    requested: watch::Receiver<bool>,
}

impl ApprovalHandle {
    pub fn approve(&self) {
        self.decide(ApprovalDecision::Approve);
    }

    pub fn reject(&self) {
        self.decide(ApprovalDecision::Reject);
    }

    pub fn decide(&self, decision: ApprovalDecision) {
        self.decision.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(decision);
                true
            } else {
                false
            }
        });
    }

    /// Resolves once the run reaches the gate and starts waiting.
    ///
    /// Pends forever if the gate is dropped without being waited on.
    pub async fn requested(&self) {
        let mut rx = self.requested.clone();
        if rx.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Consumed once per production promotion.
#[derive(Debug)]
pub struct ApprovalGate {
    decision: watch::Receiver<Option<ApprovalDecision>>,
    requested: watch::Sender<bool>,
    // Keeps `decision` open for gates that were created already decided.
    _owner: Option<watch::Sender<Option<ApprovalDecision>>>,
}

impl ApprovalGate {
    /// Create a gate and the handle that decides it.
    pub fn channel() -> (ApprovalHandle, ApprovalGate) {
        let (decision_tx, decision_rx) = watch::channel(None);
        let (requested_tx, requested_rx) = watch::channel(false);
        (
            ApprovalHandle {
                decision: decision_tx,
                requested: requested_rx,
            },
            ApprovalGate {
                decision: decision_rx,
                requested: requested_tx,
                _owner: None,
            },
        )
    }

    /// A gate that is already decided.
    pub fn decided(decision: ApprovalDecision) -> Self {
        let (decision_tx, decision_rx) = watch::channel(Some(decision));
        let (requested_tx, _) = watch::channel(false);
        ApprovalGate {
            decision: decision_rx,
            requested: requested_tx,
            _owner: Some(decision_tx),
        }
    }

    pub fn pre_approved() -> Self {
        Self::decided(ApprovalDecision::Approve)
    }

    /// Wait for a decision, at most `timeout`.
    ///
    /// A handle dropped without deciding counts as no signal: the wait runs
    /// until the timeout.
    pub async fn wait(mut self, timeout: Duration, cancel: &CancelToken) -> ApprovalOutcome {
        self.requested.send_replace(true);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut handle_alive = true;

        loop {
            if let Some(decision) = *self.decision.borrow_and_update() {
                return match decision {
                    ApprovalDecision::Approve => ApprovalOutcome::Approved,
                    ApprovalDecision::Reject => ApprovalOutcome::Rejected,
                };
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ApprovalOutcome::Cancelled,
                changed = self.decision.changed(), if handle_alive => {
                    if changed.is_err() {
                        handle_alive = false;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return ApprovalOutcome::TimedOut,
            }
        }
    }
}

/// Decide from a file once the gate is reached.
///
/// Polls `path` every `poll` for content `approve` or `reject`; other
/// content is ignored until it changes.
pub fn spawn_file_source(path: PathBuf, poll: Duration, handle: ApprovalHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        handle.requested().await;
        tracing::info!(path = %path.display(), "waiting for approval decision file");

        loop {
            if let Ok(content) = tokio::fs::read_to_string(&path).await
                && let Some(decision) = ApprovalDecision::parse(&content)
            {
                tracing::info!(?decision, "approval decision read from file");
                handle.decide(decision);
                return;
            }
            tokio::time::sleep(poll).await;
        }
    })
}

/// Ask on the terminal once the gate is reached.
///
/// End of input leaves the gate undecided so it times out.
pub fn spawn_stdin_prompt(prompt: String, handle: ApprovalHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        handle.requested().await;
        eprint!("{prompt} [y/N] ");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => {
                let decision =
                    ApprovalDecision::parse(&line).unwrap_or(ApprovalDecision::Reject);
                handle.decide(decision);
            }
            Ok(None) => tracing::warn!("stdin closed before an approval decision"),
            Err(e) => tracing::warn!(error = %e, "failed to read approval decision"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;

    #[tokio::test(start_paused = true)]
    async fn no_signal_times_out() {
        let (_handle, gate) = ApprovalGate::channel();
        let start = tokio::time::Instant::now();

        let outcome = gate.wait(Duration::from_secs(60), &CancelToken::never()).await;

        assert_eq!(outcome, ApprovalOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_still_times_out() {
        let (handle, gate) = ApprovalGate::channel();
        drop(handle);
        let outcome = gate.wait(Duration::from_secs(5), &CancelToken::never()).await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn approval_after_request_is_observed() {
        let (handle, gate) = ApprovalGate::channel();
        let approver = tokio::spawn(async move {
            handle.requested().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.approve();
            handle.reject();
        });

        let outcome = gate.wait(Duration::from_secs(60), &CancelToken::never()).await;

        assert_eq!(outcome, ApprovalOutcome::Approved);
        approver.await.unwrap();
    }

    #[tokio::test]
    async fn pre_approved_gate_returns_immediately() {
        let outcome = ApprovalGate::pre_approved()
            .wait(Duration::ZERO, &CancelToken::never())
            .await;
        assert_eq!(outcome, ApprovalOutcome::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wins_over_pending_wait() {
        let (_handle, gate) = ApprovalGate::channel();
        let (canceller, token) = cancellation();
        canceller.cancel();

        let outcome = gate.wait(Duration::from_secs(60), &token).await;
        assert_eq!(outcome, ApprovalOutcome::Cancelled);
    }

    #[tokio::test]
    async fn file_source_decides_from_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decision");
        let (handle, gate) = ApprovalGate::channel();
        let source = spawn_file_source(path.clone(), Duration::from_millis(10), handle);

        std::fs::write(&path, "reject\n").unwrap();
        let outcome = gate.wait(Duration::from_secs(10), &CancelToken::never()).await;

        assert_eq!(outcome, ApprovalOutcome::Rejected);
        source.await.unwrap();
    }

    #[test]
    fn decision_words() {
        assert_eq!(ApprovalDecision::parse(" Approve\n"), Some(ApprovalDecision::Approve));
        assert_eq!(ApprovalDecision::parse("y"), Some(ApprovalDecision::Approve));
        assert_eq!(ApprovalDecision::parse("no"), Some(ApprovalDecision::Reject));
        assert_eq!(ApprovalDecision::parse("maybe"), None);
    }
}
