//! Named numeric interface handles.
//!
//! An [`InterfaceHandle`] is one writable `f64` shared between the component
//! that writes it in phase 2 and whoever reads it (hardware layer, a
//! downstream stage, tests). Reads and writes are single atomic operations on
//! the value's bit pattern, so the real-time side never locks.
//!
//! The [`HandleRegistry`] owns the name → handle map. It is only touched from
//! the management context (configure / activate / deactivate / cleanup);
//! components keep clones of the handles they claimed and use those on the
//! real-time path.

use crate::consts::HANDLE_NAME_SEPARATOR;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors from the handle registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// No handle with that name is registered.
    #[error("Handle not found: {0}")]
    NotFound(String),

    /// A handle with that name is already registered.
    #[error("Handle already exported: {0}")]
    AlreadyExported(String),

    /// Another component already claimed the handle for writing.
    #[error("Handle {name} already claimed by {owner}")]
    AlreadyClaimed {
        /// Handle name.
        name: String,
        /// Current owner.
        owner: String,
    },
}

#[derive(Debug)]
struct HandleCell {
    name: String,
    bits: AtomicU64,
}

/// Shared numeric handle. Cloning yields another reference to the same value.
#[derive(Debug, Clone)]
pub struct InterfaceHandle {
    cell: Arc<HandleCell>,
}

impl InterfaceHandle {
    /// Create a detached handle (not registered anywhere).
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            cell: Arc::new(HandleCell {
                name: name.into(),
                bits: AtomicU64::new(initial.to_bits()),
            }),
        }
    }

    /// Full handle name, e.g. `"joint1/position"`.
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.cell.bits.load(Ordering::Acquire))
    }

    /// Overwrite the value.
    #[inline]
    pub fn set(&self, value: f64) {
        self.cell.bits.store(value.to_bits(), Ordering::Release);
    }
}

/// Build the exported name of a component-owned handle.
pub fn handle_name(component: &str, interface: &str) -> String {
    format!("{component}{HANDLE_NAME_SEPARATOR}{interface}")
}

#[derive(Debug)]
struct HandleEntry {
    handle: InterfaceHandle,
    exported_by: Option<String>,
    claimed_by: Option<String>,
}

/// Registry of named handles with exclusive write claims.
///
/// Constructed at startup and shared as `Arc<HandleRegistry>`. No global
/// state.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: Mutex<HashMap<String, HandleEntry>>,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, HandleEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a hardware-side handle (not owned by any component).
    ///
    /// # Errors
    /// `HandleError::AlreadyExported` if the name is taken.
    pub fn register(&self, name: &str, initial: f64) -> Result<InterfaceHandle, HandleError> {
        self.insert(name, initial, None)
    }

    /// Export a component-owned handle named `"<component>/<interface>"`.
    pub fn export(
        &self,
        component: &str,
        interface: &str,
        initial: f64,
    ) -> Result<InterfaceHandle, HandleError> {
        self.insert(&handle_name(component, interface), initial, Some(component))
    }

    fn insert(
        &self,
        name: &str,
        initial: f64,
        exported_by: Option<&str>,
    ) -> Result<InterfaceHandle, HandleError> {
        let mut entries = self.entries();
        if entries.contains_key(name) {
            return Err(HandleError::AlreadyExported(name.to_string()));
        }
        let handle = InterfaceHandle::new(name, initial);
        entries.insert(
            name.to_string(),
            HandleEntry {
                handle: handle.clone(),
                exported_by: exported_by.map(str::to_string),
                claimed_by: None,
            },
        );
        Ok(handle)
    }

    /// Remove every handle exported by `component`. Returns the count removed.
    pub fn unexport_all(&self, component: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.exported_by.as_deref() != Some(component));
        before - entries.len()
    }

    /// Look up a handle for reading.
    pub fn get(&self, name: &str) -> Option<InterfaceHandle> {
        self.entries().get(name).map(|e| e.handle.clone())
    }

    /// Claim a handle for exclusive writing by `owner`.
    ///
    /// Claiming a handle the same owner already holds succeeds.
    pub fn claim(&self, name: &str, owner: &str) -> Result<InterfaceHandle, HandleError> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| HandleError::NotFound(name.to_string()))?;
        match entry.claimed_by.as_deref() {
            Some(current) if current != owner => Err(HandleError::AlreadyClaimed {
                name: name.to_string(),
                owner: current.to_string(),
            }),
            _ => {
                entry.claimed_by = Some(owner.to_string());
                Ok(entry.handle.clone())
            }
        }
    }

    /// Release every claim held by `owner`. Returns the count released.
    pub fn release_all(&self, owner: &str) -> usize {
        let mut released = 0;
        for entry in self.entries().values_mut() {
            if entry.claimed_by.as_deref() == Some(owner) {
                entry.claimed_by = None;
                released += 1;
            }
        }
        released
    }

    /// Current writer of a handle, if claimed.
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.entries().get(name).and_then(|e| e.claimed_by.clone())
    }

    /// Sorted list of registered handle names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries().keys().cloned().collect();
        names.sort();
        names
    }
}
