//! Relay component vocabulary.
//!
//! This module contains the types shared by every relay component and by
//! the control loop that drives them.

pub mod component;
pub mod config;
pub mod handles;
pub mod types;
