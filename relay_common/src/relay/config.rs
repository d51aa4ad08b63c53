//! Relay configuration types.
//!
//! - `RelayConfig` - Main configuration loaded from relay.toml
//! - `ComponentConfig` - Per-component parameters, resolved at configure time
//! - `SocketConfig` - Socket-backed producer parameters
//! - `ComponentKind` / `StalenessPolicy` - Closed sets of variants
//!
//! # TOML Example
//!
//! ```toml
//! cycle_time_us = 1000
//!
//! [shared]
//! service_name = "relay-cell-01"
//!
//! [[components]]
//! name = "forward_position"
//! kind = "passthrough"
//! interfaces = ["joint1/position", "joint2/position"]
//!
//! [[components]]
//! name = "joint1_feedback"
//! kind = "position_feedback"
//! interfaces = ["joint1"]
//! staleness = "latch"
//! slowdown = 50.0
//!
//! [components.socket]
//! port = 23286
//! ```

use crate::config::{ConfigError, SharedConfig};
use crate::consts::{CYCLE_TIME_US, DEFAULT_POLL_PERIOD_MS, MAX_AXES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

fn default_cycle_time_us() -> u32 {
    CYCLE_TIME_US
}

fn default_poll_period_ms() -> u64 {
    DEFAULT_POLL_PERIOD_MS
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_slowdown() -> f64 {
    1.0
}

/// Component variants known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Chainable controller forwarding callback-delivered commands to
    /// command handles.
    Passthrough,
    /// Socket-fed sensor integrating a received velocity into a position.
    PositionFeedback,
}

impl ComponentKind {
    /// Registry key for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::PositionFeedback => "position_feedback",
        }
    }
}

/// What happens when the producer stops delivering data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// Keep the last accepted value. Producers publish nothing on timeout.
    #[default]
    Latch,
    /// Producers publish a sentinel record on receive timeout or failure,
    /// reverting the relay to "no command".
    Reset,
}

/// Parameters of a socket-backed producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocketConfig {
    /// TCP port to listen on. `0` picks an ephemeral port.
    pub port: u16,

    /// Address to bind. Defaults to all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Receive poll period; bounds how long a stop request may go unseen.
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,

    /// Delay before the receiver starts reading, in milliseconds.
    #[serde(default)]
    pub start_delay_ms: u64,
}

impl SocketConfig {
    /// Poll period as a `Duration`.
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    /// Receiver start delay as a `Duration`.
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

/// Per-component configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    /// Unique component name; prefix of exported handle names.
    pub name: String,

    /// Component variant.
    pub kind: ComponentKind,

    /// Ordered axis / interface names (the axis identity list).
    pub interfaces: Vec<String>,

    /// Handles written in phase 2. Defaults to `interfaces`.
    #[serde(default)]
    pub command_interfaces: Vec<String>,

    /// Behavior when the producer stops delivering data.
    #[serde(default)]
    pub staleness: StalenessPolicy,

    /// Start in chained mode (references fed by an upstream stage).
    #[serde(default)]
    pub chained: bool,

    /// Simulated activation delay in milliseconds.
    #[serde(default)]
    pub start_delay_ms: u64,

    /// Simulated deactivation delay in milliseconds.
    #[serde(default)]
    pub stop_delay_ms: u64,

    /// Divisor applied when integrating velocity into position.
    #[serde(default = "default_slowdown")]
    pub slowdown: f64,

    /// Socket producer parameters (socket-backed kinds only).
    #[serde(default)]
    pub socket: Option<SocketConfig>,
}

impl ComponentConfig {
    /// Minimal configuration for a component of `kind` over `interfaces`.
    pub fn new(name: &str, kind: ComponentKind, interfaces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            command_interfaces: Vec::new(),
            staleness: StalenessPolicy::default(),
            chained: false,
            start_delay_ms: 0,
            stop_delay_ms: 0,
            slowdown: default_slowdown(),
            socket: None,
        }
    }

    /// Activation delay as a `Duration`.
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Deactivation delay as a `Duration`.
    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms)
    }

    /// Number of axes (length of the axis identity list).
    #[inline]
    pub fn axis_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Names of the handles written in phase 2.
    pub fn command_interface_names(&self) -> &[String] {
        if self.command_interfaces.is_empty() {
            &self.interfaces
        } else {
            &self.command_interfaces
        }
    }

    /// Validate the component configuration.
    ///
    /// # Validation Rules
    /// 1. `name` non-empty
    /// 2. `interfaces` non-empty, at most `MAX_AXES`, names unique
    /// 3. `command_interfaces` empty or same length as `interfaces`
    /// 4. `slowdown` finite and > 0
    /// 5. `position_feedback` has exactly one interface and a `[socket]` table
    /// 6. `socket.poll_period_ms` > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "component name cannot be empty".to_string(),
            ));
        }

        if self.interfaces.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{}: interfaces cannot be empty",
                self.name
            )));
        }

        if self.interfaces.len() > MAX_AXES {
            return Err(ConfigError::ValidationError(format!(
                "{}: too many interfaces: {} (max {})",
                self.name,
                self.interfaces.len(),
                MAX_AXES
            )));
        }

        let mut seen = HashSet::new();
        for interface in &self.interfaces {
            if interface.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{}: interface names cannot be empty",
                    self.name
                )));
            }
            if !seen.insert(interface) {
                return Err(ConfigError::ValidationError(format!(
                    "{}: duplicate interface name: {}",
                    self.name, interface
                )));
            }
        }

        if !self.command_interfaces.is_empty()
            && self.command_interfaces.len() != self.interfaces.len()
        {
            return Err(ConfigError::ValidationError(format!(
                "{}: {} command_interfaces for {} interfaces",
                self.name,
                self.command_interfaces.len(),
                self.interfaces.len()
            )));
        }

        if !self.slowdown.is_finite() || self.slowdown <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "{}: slowdown must be a positive number, got {}",
                self.name, self.slowdown
            )));
        }

        if self.kind == ComponentKind::PositionFeedback {
            if self.interfaces.len() != 1 {
                return Err(ConfigError::ValidationError(format!(
                    "{}: position_feedback has exactly one interface, got {}",
                    self.name,
                    self.interfaces.len()
                )));
            }
            if self.socket.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "{}: position_feedback requires a [socket] table",
                    self.name
                )));
            }
        }

        if let Some(socket) = &self.socket {
            if socket.poll_period_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{}: socket.poll_period_ms must be greater than 0",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Main configuration loaded from `relay.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Fields shared by all relay applications.
    pub shared: SharedConfig,

    /// Control-loop cycle time in microseconds.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,

    /// Components, in control-loop order (upstream stages first).
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl RelayConfig {
    /// Cycle time as a `Duration`.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(u64::from(self.cycle_time_us))
    }

    /// Validate the whole configuration, including every component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_time_us must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for component in &self.components {
            component.validate()?;
            if !names.insert(&component.name) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate component name: {}",
                    component.name
                )));
            }
        }

        Ok(())
    }
}
