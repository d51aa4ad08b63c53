//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use relay_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use relay_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::relay::config::{
    ComponentConfig, ComponentKind, RelayConfig, SocketConfig, StalenessPolicy,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{CYCLE_TIME_US, MAX_AXES};

// ─── Lifecycle ──────────────────────────────────────────────────────
pub use crate::lifecycle::{
    LifecycleState, LifecycleStateMachine, LifecycleTransition, TransitionResult,
};

// ─── Components ─────────────────────────────────────────────────────
pub use crate::relay::component::{
    CommandSink, ComponentDiagnostics, ComponentError, ComponentFactory, CycleError,
    RtComponent,
};
pub use crate::relay::handles::{HandleError, HandleRegistry, InterfaceHandle};
pub use crate::relay::types::{CommandRecord, RecordError};

/// Default control-loop cycle time as Duration.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(CYCLE_TIME_US as u64);
