//! Relay component trait and error types.
//!
//! This module defines:
//! - `RtComponent` trait - Capability interface of every relay component
//! - `ComponentError` enum - Errors of lifecycle transitions
//! - `CycleError` enum - Per-cycle errors of phase 1 / phase 2
//! - `ComponentFactory` type alias - Factory function type
//! - `ComponentDiagnostics` struct - Optional component diagnostics
//! - `CommandSink` trait - Transport-facing entry point of callback producers

use crate::config::ConfigError;
use crate::lifecycle::{LifecycleState, LifecycleTransition};
use crate::relay::config::{ComponentConfig, ComponentKind};
use crate::relay::handles::{HandleError, HandleRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors of lifecycle transitions.
///
/// Fatal to the transition that raised them; never raised on the
/// real-time path.
#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    /// Bad or missing parameter, wrong axis count.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// OS resource could not be acquired (e.g. socket bind).
    #[error("Resource acquisition failed: {0}")]
    ResourceAcquisition(String),

    /// Transition not allowed from the current state.
    #[error("Transition '{transition}' not allowed in state '{state}': {reason}")]
    InvalidTransition {
        /// State at the time of the request.
        state: LifecycleState,
        /// Requested transition.
        transition: LifecycleTransition,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No component factory registered under that name.
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Output or reference handle problem.
    #[error(transparent)]
    Handle(#[from] HandleError),
}

impl From<ConfigError> for ComponentError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Per-cycle errors of phase 1 and phase 2.
///
/// `Copy` and heap-free so they can be produced on the real-time path.
/// They affect the current cycle only; the loop continues next period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CycleError {
    /// Inbound record length differs from the axis count.
    #[error("command size ({received}) does not match number of axes ({expected})")]
    ShapeMismatch {
        /// Configured axis count.
        expected: usize,
        /// Length of the record received.
        received: usize,
    },

    /// Inbound record carries NaN or infinity on an axis.
    #[error("non-finite command value on axis {axis}")]
    NonFiniteValue {
        /// Index of the first offending axis.
        axis: usize,
    },

    /// Phase invoked outside the Active state.
    #[error("component not active (state: {0})")]
    NotActive(LifecycleState),
}

/// Factory function type for creating component instances by name.
pub type ComponentFactory = fn(name: &str) -> Box<dyn RtComponent>;

/// Optional component diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentDiagnostics {
    /// Records consumed from the handoff buffer and applied.
    pub accepted: u64,
    /// Records rejected in phase 1.
    pub rejected: u64,
    /// Phase 2 calls that wrote at least one output.
    pub writes: u64,
    /// Records published by the producer.
    pub published: u64,
    /// Published records overwritten before being consumed.
    pub overwritten: u64,
}

/// Entry point a message transport calls with each inbound command.
///
/// Runs on the transport's thread, never on the real-time path.
pub trait CommandSink: Send + Sync {
    /// Offer one command. Returns `true` if it was published.
    fn on_message(&self, values: &[f64]) -> bool;
}

/// Capability interface of a relay component.
///
/// The component manager drives these callbacks from the lifecycle state
/// machine; the control loop calls the two phases while Active.
///
/// # Lifecycle
///
/// 1. `on_configure()` - Fix the axis list, export handles, start producer
/// 2. `on_activate()` - Reset relay state and buffer, claim outputs
/// 3. `update_reference()` / `update_and_write()` - Every cycle while Active
/// 4. `on_deactivate()` - Push sentinel record, release outputs
/// 5. `on_cleanup()` / `on_shutdown()` - Stop and join producer, release all
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `on_*` transitions | None (management context, may block) |
/// | `update_reference()` | **HARD** - no blocking, no allocation |
/// | `update_and_write()` | **HARD** - no blocking, no allocation |
pub trait RtComponent: Send {
    /// Instance name; prefix of exported handle names.
    fn name(&self) -> &str;

    /// Component variant.
    fn kind(&self) -> ComponentKind;

    /// Resolve parameters, export handles and start the producer.
    ///
    /// # Errors
    /// `ComponentError::Configuration` on invalid parameters,
    /// `ComponentError::ResourceAcquisition` if the producer cannot start.
    fn on_configure(
        &mut self,
        config: &ComponentConfig,
        handles: &HandleRegistry,
    ) -> Result<(), ComponentError>;

    /// Reset state to sentinel and claim output handles.
    fn on_activate(&mut self, handles: &HandleRegistry) -> Result<(), ComponentError>;

    /// Push a sentinel record and release output handles.
    fn on_deactivate(&mut self, handles: &HandleRegistry) -> Result<(), ComponentError>;

    /// Stop and join the producer, release sockets and exported handles.
    ///
    /// Must be idempotent. Teardown problems are logged, not returned, so
    /// the state machine cannot deadlock.
    fn on_cleanup(&mut self, handles: &HandleRegistry);

    /// Terminal release. Defaults to the cleanup release.
    fn on_shutdown(&mut self, handles: &HandleRegistry) {
        self.on_cleanup(handles);
    }

    /// Phase 1: pull the latest record into the reference relay state.
    fn update_reference(&mut self, time: Instant, period: Duration) -> Result<(), CycleError>;

    /// Phase 2: apply the reference relay state to the output handles.
    fn update_and_write(&mut self, time: Instant, period: Duration) -> Result<(), CycleError>;

    /// Whether the component can act as a downstream stage in a chain.
    fn is_chainable(&self) -> bool {
        false
    }

    /// Switch chained mode. Returns `false` if the mode is not supported.
    fn set_chained_mode(&mut self, _chained: bool) -> bool {
        false
    }

    /// Whether references are currently fed by an upstream stage.
    fn is_in_chained_mode(&self) -> bool {
        false
    }

    /// Mutable view of the reference relay state, for a chaining layer
    /// writing between phase 1 and phase 2.
    fn references_mut(&mut self) -> Option<&mut [f64]> {
        None
    }

    /// Callback entry point for components fed by a message transport.
    fn command_sink(&self) -> Option<Arc<dyn CommandSink>> {
        None
    }

    /// Get component-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<ComponentDiagnostics> {
        None
    }
}
