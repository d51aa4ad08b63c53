//! Passthrough controller module.
//!
//! Forwards commands delivered by a message transport to command handles,
//! one value per axis. Chainable: an upstream stage can feed its exported
//! reference handles instead.

mod controller;

pub use controller::PassthroughController;

use relay_common::relay::component::RtComponent;

/// Factory function to create a passthrough controller instance.
pub fn create_component(name: &str) -> Box<dyn RtComponent> {
    Box::new(PassthroughController::new(name))
}
