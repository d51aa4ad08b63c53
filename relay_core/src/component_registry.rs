//! Component registry.
//!
//! Provides a `ComponentRegistry` struct for registering component factories
//! by [`ComponentKind`] and creating named instances from them. Uses
//! constructor injection rather than global state.

use relay_common::relay::component::{ComponentError, ComponentFactory, RtComponent};
use relay_common::relay::config::ComponentKind;
use std::collections::HashMap;

/// Registry of available component kinds.
///
/// Constructed at startup, populated via `register()`, and passed to
/// `ControlLoop::new` by reference. No global state.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<ComponentKind, ComponentFactory>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a component factory.
    ///
    /// # Panics
    /// Panics if a factory for the same kind is already registered.
    pub fn register(&mut self, kind: ComponentKind, factory: ComponentFactory) {
        if self.factories.contains_key(&kind) {
            panic!("Component kind '{}' is already registered", kind.as_str());
        }
        self.factories.insert(kind, factory);
    }

    /// Get a factory by kind.
    pub fn get_factory(&self, kind: ComponentKind) -> Option<ComponentFactory> {
        self.factories.get(&kind).copied()
    }

    /// Create a component instance named `name`.
    ///
    /// # Errors
    /// Returns `ComponentError::ComponentNotFound` if no factory is
    /// registered for `kind`.
    pub fn create(&self, kind: ComponentKind, name: &str) -> Result<Box<dyn RtComponent>, ComponentError> {
        let factory = self
            .get_factory(kind)
            .ok_or_else(|| ComponentError::ComponentNotFound(kind.as_str().to_string()))?;
        Ok(factory(name))
    }

    /// List all registered kinds.
    pub fn list_kinds(&self) -> Vec<ComponentKind> {
        self.factories.keys().copied().collect()
    }
}
