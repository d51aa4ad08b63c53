//! Component lifecycle: states and the transition table.
//!
//! Unconfigured → Inactive ↔ Active, with Cleanup back to Unconfigured,
//! Error on a failed transition, and a terminal Shutdown reachable from
//! every non-terminal state.
//!
//! The table only decides *whether* a transition is legal. Running the
//! component callbacks and choosing between the success target and
//! [`LifecycleTransition::Fail`] is the job of the component manager.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one component.
///
/// Exactly one instance per component; transitions are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    /// Created, no parameters loaded, no producer running.
    #[default]
    Unconfigured = 0,
    /// Configured; producer running, outputs not written.
    Inactive = 1,
    /// Phase 1 / phase 2 are invoked by the scheduler.
    Active = 2,
    /// Transitional: producer being stopped and resources released.
    Cleanup = 3,
    /// Terminal. All resources released.
    Shutdown = 4,
    /// A configure or activate transition failed.
    Error = 5,
}

impl LifecycleState {
    /// Only an active component takes part in the control cycle.
    #[inline]
    pub const fn allows_cycle(self) -> bool {
        matches!(self, Self::Active)
    }

    /// States in which the producer adapter (if any) may be running.
    #[inline]
    pub const fn holds_resources(self) -> bool {
        matches!(self, Self::Inactive | Self::Active | Self::Error)
    }

    /// `true` once the component can no longer change state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Cleanup => "cleanup",
            Self::Shutdown => "shutdown",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Transition requested from the management context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleTransition {
    /// Load parameters, fix the axis list, start the producer.
    Configure,
    /// Reset relay state and buffer to sentinel, claim outputs.
    Activate,
    /// Push a sentinel record, release outputs; producer keeps running.
    Deactivate,
    /// Begin stopping the producer and releasing resources.
    Cleanup,
    /// Resources released; back to Unconfigured.
    CleanupComplete,
    /// Terminal release.
    Shutdown,
    /// A transition callback failed.
    Fail,
}

impl fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Cleanup => "cleanup",
            Self::CleanupComplete => "cleanup_complete",
            Self::Shutdown => "shutdown",
            Self::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Result of a lifecycle transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded, new state.
    Ok(LifecycleState),
    /// Transition rejected, with reason.
    Rejected(&'static str),
}

/// Lifecycle state holder enforcing the transition table.
#[derive(Debug, Clone, Default)]
pub struct LifecycleStateMachine {
    state: LifecycleState,
}

impl LifecycleStateMachine {
    /// Create a new state machine in `Unconfigured`.
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Unconfigured,
        }
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Check a transition without applying it.
    pub fn check(&self, transition: LifecycleTransition) -> TransitionResult {
        match next_state(self.state, transition) {
            Some(next) => TransitionResult::Ok(next),
            None => TransitionResult::Rejected(invalid_transition_reason(self.state, transition)),
        }
    }

    /// Apply a transition.
    ///
    /// Returns `TransitionResult::Ok(new_state)` on success, or
    /// `TransitionResult::Rejected(reason)` leaving the state unchanged.
    pub fn handle(&mut self, transition: LifecycleTransition) -> TransitionResult {
        let result = self.check(transition);
        if let TransitionResult::Ok(next) = result {
            self.state = next;
        }
        result
    }
}

fn next_state(state: LifecycleState, transition: LifecycleTransition) -> Option<LifecycleState> {
    use LifecycleState::*;
    use LifecycleTransition as T;

    match (state, transition) {
        (Unconfigured, T::Configure) => Some(Inactive),
        (Inactive, T::Activate) => Some(Active),
        (Active, T::Deactivate) => Some(Inactive),

        (Inactive | Active | Error, T::Cleanup) => Some(Cleanup),
        (Cleanup, T::CleanupComplete) => Some(Unconfigured),

        (Shutdown, _) => None,
        (_, T::Shutdown) => Some(Shutdown),
        (_, T::Fail) => Some(Error),

        _ => None,
    }
}

fn invalid_transition_reason(state: LifecycleState, transition: LifecycleTransition) -> &'static str {
    use LifecycleState::*;
    use LifecycleTransition as T;

    match (state, transition) {
        (Shutdown, _) => "Shutdown: terminal state",
        (Active, T::Configure) => "Active: no reconfiguration while active",
        (Unconfigured, _) => "Unconfigured: only Configure or Shutdown allowed",
        (Inactive, _) => "Inactive: only Activate, Cleanup or Shutdown allowed",
        (Active, _) => "Active: only Deactivate, Cleanup or Shutdown allowed",
        (Cleanup, _) => "Cleanup: waiting for resources to be released",
        (Error, _) => "Error: only Cleanup or Shutdown allowed",
    }
}
