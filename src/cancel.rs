// ABOUTME: Cooperative cancellation for promotion runs.
// ABOUTME: A Canceller flips a watch channel; CancelTokens observe it at wait points.

use tokio::sync::watch;

/// Requests cancellation of every token created from it.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

/// Observes a [`Canceller`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked canceller and token.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelToken { rx })
}

impl Canceller {
    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the
    /// canceller is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_observes_cancel() {
        let (canceller, token) = cancellation();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        canceller.cancel();

        waiter.await.unwrap();
        assert!(token.is_cancelled());
        assert!(canceller.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_does_not_resolve() {
        let token = CancelToken::never();
        let result = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(result.is_err());
    }
}
