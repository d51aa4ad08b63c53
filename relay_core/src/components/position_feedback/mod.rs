//! Position feedback sensor module.
//!
//! A single-axis sensor whose commands arrive over a TCP socket as measured
//! velocities. Each cycle the velocity is integrated into a position that is
//! written to the axis' position handle.

mod sensor;

pub use sensor::PositionFeedbackSensor;

use relay_common::relay::component::RtComponent;

/// Factory function to create a position feedback sensor instance.
pub fn create_component(name: &str) -> Box<dyn RtComponent> {
    Box::new(PositionFeedbackSensor::new(name))
}
