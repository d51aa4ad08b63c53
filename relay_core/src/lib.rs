//! # Relay Core Library
//!
//! Real-time command relay with a pluggable component architecture.
//!
//! Commands arrive on non-real-time producer threads (a TCP reader or a
//! transport callback), cross a wait-free handoff buffer, and are applied to
//! named output handles by components driven through a two-phase update on
//! a fixed-rate control loop. Components implement the `RtComponent` trait
//! defined in `relay_common::relay::component`.
//!
//! # Module Structure
//!
//! - [`core`] - ControlLoop struct, RT loop and bulk lifecycle management
//! - [`managed`] - Lifecycle state machine wrapper around a component
//! - [`component_registry`] - Component factory registration
//! - [`components`] - Relay component implementations
//! - [`handoff`] - Single-slot latest-value buffer (triple buffer)
//! - [`producer`] - Socket and callback producer adapters
//! - [`relay`] - Reference relay state and the two-phase protocol
//! - [`throttle`] - Rate-limited diagnostics
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     relay_core (single crate)                     │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │  Producer    │───►│   Handoff    │───►│  ReferenceRelay     │  │
//! │  │ (socket/cb)  │    │  (3 slots)   │    │  (phase 1)          │  │
//! │  └──────────────┘    └──────────────┘    └──────────┬──────────┘  │
//! │                                                     │ phase 2     │
//! │  ┌──────────────┐                        ┌──────────▼──────────┐  │
//! │  │ ControlLoop  │── try_lock per cycle ─►│  HandleRegistry     │  │
//! │  │  (RT loop)   │                        │  (output handles)   │  │
//! │  └──────────────┘                        └─────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod component_registry;
pub mod components;
pub mod core;
pub mod handoff;
pub mod managed;
pub mod producer;
pub mod relay;
pub mod throttle;

// Re-export key types for convenience
pub use crate::component_registry::ComponentRegistry;
pub use crate::core::{ControlLoop, CycleReport, TimingStats};
pub use crate::handoff::{HandoffConsumer, HandoffProducer, HandoffStats, handoff};
pub use crate::managed::{ManagedComponent, SharedComponent};
pub use crate::producer::{CommandSubscriber, ProducerError, SocketProducer};
pub use crate::relay::{ReferenceRelay, RelayUpdate};
