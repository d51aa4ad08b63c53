//! Relay Common Library
//!
//! This crate provides the shared vocabulary of the real-time command relay
//! workspace: lifecycle states, the component capability trait, the command
//! record type, named output handles and configuration loading.
//!
//! # Module Structure
//!
//! - [`consts`] - Workspace-wide limits and defaults
//! - [`config`] - Configuration loading traits and types
//! - [`lifecycle`] - Lifecycle state enum and transition table
//! - [`relay`] - Component trait, command records, handles, component config
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use relay_common::prelude::*;
//!
//! let record = CommandRecord::from_slice(&[1.0, 2.0, 3.0]).unwrap();
//! assert_eq!(record.len(), 3);
//! ```

pub mod config;
pub mod consts;
pub mod lifecycle;
pub mod prelude;
pub mod relay;
