// ABOUTME: A promotion run parameterized by its current state marker.
// ABOUTME: Accumulates the reported state history and health checks until it is finished.

use super::outcome::{Destination, HealthCheck, Outcome, PromotionReport, PromotionState};
use super::state::Idle;
use crate::types::ImageRef;

/// A promotion in progress, parameterized by its current state.
///
/// Only the transitions valid from `S` exist as methods, so a run cannot
/// reach production without passing staging and the approval gate.
#[derive(Debug)]
pub struct Promotion<S> {
    pub(crate) candidate: ImageRef,
    pub(crate) destination: Destination,
    pub(crate) states: Vec<PromotionState>,
    pub(crate) health_checks: Vec<HealthCheck>,
    pub(crate) state: S,
}

impl Promotion<Idle> {
    pub fn new(candidate: ImageRef, destination: Destination) -> Self {
        Promotion {
            candidate,
            destination,
            states: vec![PromotionState::Idle],
            health_checks: Vec::new(),
            state: Idle,
        }
    }
}

impl<S> Promotion<S> {
    pub fn candidate(&self) -> &ImageRef {
        &self.candidate
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// Reported states entered so far.
    pub fn states(&self) -> &[PromotionState] {
        &self.states
    }

    pub fn current_state(&self) -> PromotionState {
        self.states
            .last()
            .copied()
            .unwrap_or(PromotionState::Idle)
    }

    pub fn health_checks(&self) -> &[HealthCheck] {
        &self.health_checks
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Move to `next`, optionally entering a new reported state.
    pub(crate) fn transition<T>(self, next: T, entered: Option<PromotionState>) -> Promotion<T> {
        let mut states = self.states;
        if let Some(entered) = entered {
            tracing::info!(candidate = %self.candidate, state = %entered, "promotion state");
            states.push(entered);
        }
        Promotion {
            candidate: self.candidate,
            destination: self.destination,
            states,
            health_checks: self.health_checks,
            state: next,
        }
    }

    /// End the run with `outcome`.
    ///
    /// The environment read-back is left empty; the controller fills it in.
    pub fn finish(mut self, outcome: Outcome, detail: Option<String>) -> PromotionReport {
        let terminal = outcome.terminal_state();
        if self.current_state() != terminal {
            self.states.push(terminal);
        }
        tracing::info!(candidate = %self.candidate, outcome = %outcome, "promotion finished");

        PromotionReport {
            candidate: self.candidate,
            destination: self.destination,
            states: self.states,
            outcome,
            detail,
            health_checks: self.health_checks,
            environments: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
