//! Lifecycle-managed component.
//!
//! `ManagedComponent` pairs an [`RtComponent`] with its
//! [`LifecycleStateMachine`]: transition requests are checked against the
//! transition table, the component callback runs, and the state moves to
//! the success target or to `Error` on failure.
//!
//! # Sharing
//!
//! The control loop and the management context share a component as
//! [`SharedComponent`]. Transitions take the lock with `lock()`; the loop
//! only ever uses `try_lock()` and skips the component for that cycle when a
//! transition (which may be joining a producer thread) holds it.

use crate::throttle::LogThrottle;
use relay_common::consts::DIAGNOSTIC_THROTTLE_MS;
use relay_common::lifecycle::{
    LifecycleState, LifecycleStateMachine, LifecycleTransition, TransitionResult,
};
use relay_common::relay::component::{
    CommandSink, ComponentDiagnostics, ComponentError, CycleError, RtComponent,
};
use relay_common::relay::config::ComponentConfig;
use relay_common::relay::handles::HandleRegistry;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Component shared between the control loop and the management context.
pub type SharedComponent = Arc<Mutex<ManagedComponent>>;

/// Which phase produced a cycle error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `update_reference`
    Reference,
    /// `update_and_write`
    Write,
}

/// An [`RtComponent`] driven through the lifecycle state machine.
pub struct ManagedComponent {
    component: Box<dyn RtComponent>,
    config: ComponentConfig,
    machine: LifecycleStateMachine,
    handles: Arc<HandleRegistry>,
    cycle_throttle: LogThrottle,
    cycle_errors: u64,
}

impl ManagedComponent {
    /// Wrap `component` in `Unconfigured`.
    pub fn new(
        component: Box<dyn RtComponent>,
        config: ComponentConfig,
        handles: Arc<HandleRegistry>,
    ) -> Self {
        Self {
            component,
            config,
            machine: LifecycleStateMachine::new(),
            handles,
            cycle_throttle: LogThrottle::from_millis(DIAGNOSTIC_THROTTLE_MS),
            cycle_errors: 0,
        }
    }

    /// Wrap into a [`SharedComponent`].
    pub fn into_shared(self) -> SharedComponent {
        Arc::new(Mutex::new(self))
    }

    /// Component name.
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.machine.state()
    }

    /// Configuration used on the next configure.
    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    /// Replace the configuration. Only allowed while unconfigured.
    pub fn set_config(&mut self, config: ComponentConfig) -> Result<(), ComponentError> {
        if self.state() != LifecycleState::Unconfigured {
            return Err(ComponentError::Configuration(format!(
                "{}: no reconfiguration in state {}",
                self.name(),
                self.state()
            )));
        }
        self.config = config;
        Ok(())
    }

    /// The wrapped component, for a chaining layer.
    pub fn component_mut(&mut self) -> &mut dyn RtComponent {
        self.component.as_mut()
    }

    /// Transport entry point, if the component has one.
    pub fn command_sink(&self) -> Option<Arc<dyn CommandSink>> {
        self.component.command_sink()
    }

    /// Component diagnostics.
    pub fn diagnostics(&self) -> Option<ComponentDiagnostics> {
        self.component.diagnostics()
    }

    /// Cycle errors seen so far.
    pub fn cycle_errors(&self) -> u64 {
        self.cycle_errors
    }

    fn ensure_allowed(&self, transition: LifecycleTransition) -> Result<(), ComponentError> {
        match self.machine.check(transition) {
            TransitionResult::Ok(_) => Ok(()),
            TransitionResult::Rejected(reason) => Err(ComponentError::InvalidTransition {
                state: self.state(),
                transition,
                reason,
            }),
        }
    }

    fn apply(&mut self, transition: LifecycleTransition) -> LifecycleState {
        let from = self.state();
        if let TransitionResult::Ok(to) = self.machine.handle(transition) {
            info!("{}: {} -> {} ({})", self.name(), from, to, transition);
        }
        self.state()
    }

    fn fail(&mut self, transition: LifecycleTransition, err: ComponentError) -> ComponentError {
        error!("{}: {} failed: {}", self.name(), transition, err);
        self.apply(LifecycleTransition::Fail);
        err
    }

    /// Unconfigured → Inactive. On failure the component goes to `Error`.
    pub fn configure(&mut self) -> Result<LifecycleState, ComponentError> {
        self.ensure_allowed(LifecycleTransition::Configure)?;
        if self.config.chained && !self.component.is_chainable() {
            let err = ComponentError::Configuration(format!(
                "{}: {} components cannot run chained",
                self.name(),
                self.component.kind().as_str()
            ));
            return Err(self.fail(LifecycleTransition::Configure, err));
        }
        match self.component.on_configure(&self.config, &self.handles) {
            Ok(()) => Ok(self.apply(LifecycleTransition::Configure)),
            Err(e) => Err(self.fail(LifecycleTransition::Configure, e)),
        }
    }

    /// Inactive → Active. On failure the component goes to `Error`.
    pub fn activate(&mut self) -> Result<LifecycleState, ComponentError> {
        self.ensure_allowed(LifecycleTransition::Activate)?;
        match self.component.on_activate(&self.handles) {
            Ok(()) => Ok(self.apply(LifecycleTransition::Activate)),
            Err(e) => Err(self.fail(LifecycleTransition::Activate, e)),
        }
    }

    /// Active → Inactive. The producer keeps running.
    pub fn deactivate(&mut self) -> Result<LifecycleState, ComponentError> {
        self.ensure_allowed(LifecycleTransition::Deactivate)?;
        match self.component.on_deactivate(&self.handles) {
            Ok(()) => Ok(self.apply(LifecycleTransition::Deactivate)),
            Err(e) => Err(self.fail(LifecycleTransition::Deactivate, e)),
        }
    }

    /// Inactive / Active / Error → Unconfigured through `Cleanup`.
    ///
    /// An active component is deactivated first. Teardown problems are
    /// logged by the component and never block the transition.
    pub fn cleanup(&mut self) -> Result<LifecycleState, ComponentError> {
        self.ensure_allowed(LifecycleTransition::Cleanup)?;
        if self.state() == LifecycleState::Active {
            self.deactivate_for_teardown();
        }

        self.apply(LifecycleTransition::Cleanup);
        self.component.on_cleanup(&self.handles);
        Ok(self.apply(LifecycleTransition::CleanupComplete))
    }

    /// Any state → Shutdown. Idempotent: shutting down twice is not an error.
    pub fn shutdown(&mut self) -> Result<LifecycleState, ComponentError> {
        if self.state().is_terminal() {
            return Ok(LifecycleState::Shutdown);
        }
        self.ensure_allowed(LifecycleTransition::Shutdown)?;
        if self.state() == LifecycleState::Active {
            self.deactivate_for_teardown();
        }

        self.component.on_shutdown(&self.handles);
        Ok(self.apply(LifecycleTransition::Shutdown))
    }

    fn deactivate_for_teardown(&mut self) {
        if let Err(e) = self.component.on_deactivate(&self.handles) {
            warn!("{}: deactivate during teardown failed: {}", self.name(), e);
        }
    }

    /// Phase 1. Returns `CycleError::NotActive` outside `Active`.
    #[inline]
    pub fn update_reference(&mut self, time: Instant, period: Duration) -> Result<(), CycleError> {
        let state = self.state();
        if !state.allows_cycle() {
            return Err(CycleError::NotActive(state));
        }
        self.component.update_reference(time, period)
    }

    /// Phase 2. Returns `CycleError::NotActive` outside `Active`.
    #[inline]
    pub fn update_and_write(&mut self, time: Instant, period: Duration) -> Result<(), CycleError> {
        let state = self.state();
        if !state.allows_cycle() {
            return Err(CycleError::NotActive(state));
        }
        self.component.update_and_write(time, period)
    }

    /// Count a cycle error and log it, throttled per component.
    pub fn report_cycle_error(&mut self, phase: Phase, err: CycleError) {
        self.cycle_errors += 1;
        if let Some(suppressed) = self.cycle_throttle.ready() {
            warn!(
                "{}: {:?} phase rejected command: {} ({} similar suppressed)",
                self.component.name(),
                phase,
                err,
                suppressed
            );
        }
    }
}

impl std::fmt::Debug for ManagedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedComponent")
            .field("name", &self.name())
            .field("kind", &self.component.kind())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::relay::config::ComponentKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        configure: AtomicUsize,
        deactivate: AtomicUsize,
        cleanup: AtomicUsize,
    }

    struct Stub {
        calls: Arc<Calls>,
        fail_configure: bool,
    }

    impl RtComponent for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn kind(&self) -> ComponentKind {
            ComponentKind::Passthrough
        }

        fn on_configure(
            &mut self,
            _config: &ComponentConfig,
            _handles: &HandleRegistry,
        ) -> Result<(), ComponentError> {
            self.calls.configure.fetch_add(1, Ordering::SeqCst);
            if self.fail_configure {
                return Err(ComponentError::ResourceAcquisition("port in use".to_string()));
            }
            Ok(())
        }

        fn on_activate(&mut self, _handles: &HandleRegistry) -> Result<(), ComponentError> {
            Ok(())
        }

        fn on_deactivate(&mut self, _handles: &HandleRegistry) -> Result<(), ComponentError> {
            self.calls.deactivate.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_cleanup(&mut self, _handles: &HandleRegistry) {
            self.calls.cleanup.fetch_add(1, Ordering::SeqCst);
        }

        fn update_reference(&mut self, _t: Instant, _p: Duration) -> Result<(), CycleError> {
            Ok(())
        }

        fn update_and_write(&mut self, _t: Instant, _p: Duration) -> Result<(), CycleError> {
            Ok(())
        }
    }

    fn managed(fail_configure: bool) -> (ManagedComponent, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let stub = Stub {
            calls: Arc::clone(&calls),
            fail_configure,
        };
        let config = ComponentConfig::new("stub", ComponentKind::Passthrough, &["a"]);
        (
            ManagedComponent::new(Box::new(stub), config, Arc::new(HandleRegistry::new())),
            calls,
        )
    }

    #[test]
    fn phases_outside_active_are_refused() {
        let (mut m, _) = managed(false);
        let now = Instant::now();
        assert_eq!(
            m.update_reference(now, Duration::ZERO),
            Err(CycleError::NotActive(LifecycleState::Unconfigured))
        );
        m.configure().unwrap();
        assert_eq!(
            m.update_and_write(now, Duration::ZERO),
            Err(CycleError::NotActive(LifecycleState::Inactive))
        );
        m.activate().unwrap();
        assert!(m.update_reference(now, Duration::ZERO).is_ok());
    }

    #[test]
    fn chained_config_on_unchainable_component_is_rejected() {
        let (mut m, calls) = managed(false);
        let mut config = m.config().clone();
        config.chained = true;
        m.set_config(config).unwrap();

        assert!(matches!(m.configure(), Err(ComponentError::Configuration(_))));
        assert_eq!(m.state(), LifecycleState::Error);
        assert_eq!(calls.configure.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_configure_goes_to_error() {
        let (mut m, calls) = managed(true);
        assert!(matches!(
            m.configure(),
            Err(ComponentError::ResourceAcquisition(_))
        ));
        assert_eq!(m.state(), LifecycleState::Error);

        assert_eq!(m.cleanup().unwrap(), LifecycleState::Unconfigured);
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_transition_keeps_state() {
        let (mut m, calls) = managed(false);
        let err = m.activate().unwrap_err();
        assert!(matches!(
            err,
            ComponentError::InvalidTransition {
                state: LifecycleState::Unconfigured,
                transition: LifecycleTransition::Activate,
                ..
            }
        ));
        assert_eq!(m.state(), LifecycleState::Unconfigured);
        assert_eq!(calls.configure.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cleanup_from_active_deactivates_first() {
        let (mut m, calls) = managed(false);
        m.configure().unwrap();
        m.activate().unwrap();

        assert_eq!(m.cleanup().unwrap(), LifecycleState::Unconfigured);
        assert_eq!(calls.deactivate.load(Ordering::SeqCst), 1);
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut m, calls) = managed(false);
        m.configure().unwrap();
        m.activate().unwrap();

        assert_eq!(m.shutdown().unwrap(), LifecycleState::Shutdown);
        assert_eq!(m.shutdown().unwrap(), LifecycleState::Shutdown);
        assert_eq!(calls.deactivate.load(Ordering::SeqCst), 1);
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
        assert!(m.configure().is_err());
    }

    #[test]
    fn reconfiguration_only_while_unconfigured() {
        let (mut m, _) = managed(false);
        let config = m.config().clone();
        m.set_config(config.clone()).unwrap();
        m.configure().unwrap();
        assert!(m.set_config(config).is_err());
    }
}
