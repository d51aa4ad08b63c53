//! Relay component implementations.
//!
//! - [`passthrough`] - Chainable controller fed by a message transport
//! - [`position_feedback`] - Socket-fed sensor integrating velocity to position
//!
//! # Adding New Components
//!
//! 1. Create a new submodule under `components/`
//! 2. Implement the `RtComponent` trait from `relay_common::relay::component`
//! 3. Add a `ComponentKind` variant and register the factory in
//!    [`register_all_components`]

pub mod passthrough;
pub mod position_feedback;

use crate::component_registry::ComponentRegistry;
use relay_common::relay::config::ComponentKind;
use relay_common::relay::handles::{HandleRegistry, InterfaceHandle};
use relay_common::relay::component::ComponentError;
use std::thread;
use std::time::Duration;
use tracing::info;

/// Register all built-in components.
pub fn register_all_components(registry: &mut ComponentRegistry) {
    registry.register(ComponentKind::Passthrough, passthrough::create_component);
    registry.register(
        ComponentKind::PositionFeedback,
        position_feedback::create_component,
    );
}

/// Simulated (de)activation delay, counted down in whole seconds.
pub(crate) fn count_down(component: &str, what: &str, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    info!("{}: {} ...please wait...", component, what);

    let mut left = delay;
    while !left.is_zero() {
        let step = left.min(Duration::from_secs(1));
        thread::sleep(step);
        left -= step;
        info!("{}: {:.1} seconds left...", component, left.as_secs_f64());
    }
}

/// Claim `names` for exclusive writing by `owner`, all or nothing.
pub(crate) fn claim_outputs(
    handles: &HandleRegistry,
    owner: &str,
    names: &[String],
) -> Result<Vec<InterfaceHandle>, ComponentError> {
    let mut claimed = Vec::with_capacity(names.len());
    for name in names {
        match handles.claim(name, owner) {
            Ok(handle) => claimed.push(handle),
            Err(e) => {
                handles.release_all(owner);
                return Err(e.into());
            }
        }
    }
    Ok(claimed)
}

/// Export one reference handle per interface, all or nothing.
pub(crate) fn export_references(
    handles: &HandleRegistry,
    owner: &str,
    interfaces: &[String],
) -> Result<Vec<InterfaceHandle>, ComponentError> {
    let mut exported = Vec::with_capacity(interfaces.len());
    for interface in interfaces {
        match handles.export(owner, interface, f64::NAN) {
            Ok(handle) => exported.push(handle),
            Err(e) => {
                handles.unexport_all(owner);
                return Err(e.into());
            }
        }
    }
    Ok(exported)
}
