//! System-wide constants for the relay workspace.
//!
//! Single source of truth for numeric limits and default paths.
//! Imported by both crates.

/// Maximum number of axes a single component may relay.
pub const MAX_AXES: usize = 64;

/// Default control-loop cycle time in microseconds (1 kHz = 1000 µs).
pub const CYCLE_TIME_US: u32 = 1000;

/// Default socket poll period in milliseconds (1 kHz receive loop).
pub const DEFAULT_POLL_PERIOD_MS: u64 = 1;

/// Size of the per-read socket receive buffer in bytes.
pub const SOCKET_READ_BUFFER_BYTES: usize = 1024;

/// Minimum interval between repeated diagnostics from one call site.
pub const DIAGNOSTIC_THROTTLE_MS: u64 = 1000;

/// Minimum interval between repeated "no data on socket" diagnostics.
pub const SOCKET_IDLE_THROTTLE_MS: u64 = 500;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/relay/relay.toml";

/// Separator between component name and axis name in exported handle names.
pub const HANDLE_NAME_SEPARATOR: char = '/';
