// ABOUTME: Diagnostics accumulator for non-fatal warnings during a promotion.
// ABOUTME: Collects problems that must not change the outcome but should be shown to operators.

use serde::Serialize;

/// Collects non-fatal warnings during promotion operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warning messages, in the order they were recorded.
    pub fn into_messages(self) -> Vec<String> {
        self.warnings.into_iter().map(|w| w.message).collect()
    }
}

/// A non-fatal warning collected during a promotion.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a lock release warning.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, message)
    }

    /// Create a deployment record write warning.
    pub fn record_update(message: impl Into<String>) -> Self {
        Self::new(WarningKind::RecordUpdate, message)
    }

    /// Create a warning for an environment whose running image could not be read.
    pub fn environment_readback(message: impl Into<String>) -> Self {
        Self::new(WarningKind::EnvironmentReadback, message)
    }
}

/// Categories of warnings that can occur during a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
    /// Deployment record could not be written; later rollbacks may miss it.
    RecordUpdate,
    /// Running image of an environment unknown after the run.
    EnvironmentReadback,
}
