//! Control loop and component lifecycle management.
//!
//! The `ControlLoop` struct is the main entry point for relay operations.
//! It owns the handle registry, the lifecycle-managed components, and the
//! fixed-rate loop that drives the two-phase update each period.

use crate::component_registry::ComponentRegistry;
use crate::managed::{ManagedComponent, Phase, SharedComponent};
use relay_common::config::ConfigLoader;
use relay_common::lifecycle::LifecycleState;
use relay_common::relay::component::ComponentError;
use relay_common::relay::config::RelayConfig;
use relay_common::relay::handles::HandleRegistry;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Control loop owning the components and the handle registry.
pub struct ControlLoop {
    /// Relay configuration
    config: RelayConfig,
    /// Named numeric handles shared by all components
    handles: Arc<HandleRegistry>,
    /// Components in loop order (upstream stages first)
    components: Vec<SharedComponent>,
    /// Running flag for RT loop control
    running: Arc<AtomicBool>,
    /// Cycle time from config
    cycle_time: Duration,
    /// Timing statistics
    stats: TimingStats,
}

/// Timing statistics for RT loop monitoring.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Number of timing violations (cycle exceeded target)
    pub timing_violations: u64,
    /// Maximum observed cycle time
    pub max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation
    pub total_cycle_time_us: u64,
    /// Component updates skipped because a transition held the lock
    pub skipped_updates: u64,
    /// Phase errors reported by components
    pub cycle_errors: u64,
}

/// Outcome of a single [`ControlLoop::cycle_once`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Components that ran both phases
    pub updated: usize,
    /// Components skipped because their lock was held
    pub skipped: usize,
    /// Components not in `Active`
    pub idle: usize,
    /// Phase errors raised this cycle
    pub errors: usize,
}

fn lock(component: &SharedComponent) -> MutexGuard<'_, ManagedComponent> {
    component.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ControlLoop {
    /// Create a control loop and instantiate every configured component.
    ///
    /// # Errors
    /// Returns error if configuration validation fails or a component kind
    /// has no registered factory.
    pub fn new(config: RelayConfig, registry: &ComponentRegistry) -> Result<Self, ComponentError> {
        config.validate()?;

        let handles = Arc::new(HandleRegistry::new());
        let mut components = Vec::with_capacity(config.components.len());
        for component_config in &config.components {
            let component = registry.create(component_config.kind, &component_config.name)?;
            components.push(
                ManagedComponent::new(component, component_config.clone(), Arc::clone(&handles))
                    .into_shared(),
            );
        }

        let cycle_time = config.cycle_time();
        info!(
            "ControlLoop created with {} components, cycle_time={}us",
            components.len(),
            config.cycle_time_us
        );

        Ok(Self {
            config,
            handles,
            components,
            running: Arc::new(AtomicBool::new(false)),
            cycle_time,
            stats: TimingStats::default(),
        })
    }

    /// Load and validate relay configuration from a TOML file.
    pub fn load_config(config_path: &Path) -> Result<RelayConfig, ComponentError> {
        info!("Loading configuration from {:?}", config_path);
        let config = RelayConfig::load(config_path)?;
        config.validate()?;
        info!(
            "Loaded config: service={}, {} components",
            config.shared.service_name,
            config.components.len()
        );
        Ok(config)
    }

    /// Loaded configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Handle registry shared with the components.
    pub fn handles(&self) -> &Arc<HandleRegistry> {
        &self.handles
    }

    /// Components in loop order.
    pub fn components(&self) -> &[SharedComponent] {
        &self.components
    }

    /// Look up a component by name.
    pub fn component(&self, name: &str) -> Option<SharedComponent> {
        self.components
            .iter()
            .find(|c| lock(c).name() == name)
            .cloned()
    }

    /// Register a hardware handle (initial value 0.0) for every command
    /// interface no component has exported.
    ///
    /// Call after `configure_all`, when chained references exist. Returns
    /// the names registered.
    pub fn register_hardware_handles(&self) -> Vec<String> {
        let mut registered = Vec::new();
        for component in &self.components {
            let names = lock(component).config().command_interface_names().to_vec();
            for name in names {
                if self.handles.get(&name).is_none() && self.handles.register(&name, 0.0).is_ok() {
                    debug!("Registered hardware handle {}", name);
                    registered.push(name);
                }
            }
        }
        registered
    }

    /// Configure every component in loop order. Stops at the first failure.
    pub fn configure_all(&self) -> Result<(), ComponentError> {
        for component in &self.components {
            lock(component).configure()?;
        }
        Ok(())
    }

    /// Activate every component in loop order. Stops at the first failure.
    pub fn activate_all(&self) -> Result<(), ComponentError> {
        for component in &self.components {
            lock(component).activate()?;
        }
        Ok(())
    }

    /// Deactivate every active component, downstream stages first.
    pub fn deactivate_all(&self) -> Result<(), ComponentError> {
        for component in self.components.iter().rev() {
            let mut component = lock(component);
            if component.state() == LifecycleState::Active {
                component.deactivate()?;
            }
        }
        Ok(())
    }

    /// Clean up every component holding resources or in `Error`.
    pub fn cleanup_all(&self) -> Result<(), ComponentError> {
        for component in self.components.iter().rev() {
            let mut component = lock(component);
            let state = component.state();
            if state.holds_resources() {
                component.cleanup()?;
            }
        }
        Ok(())
    }

    /// Run both phases once for every active component, in loop order.
    ///
    /// Upstream stages write their outputs before downstream stages read
    /// them in phase 1. A component whose lock is held by a transition is
    /// skipped for the whole cycle. Never blocks or allocates.
    pub fn cycle_once(&mut self, time: Instant, period: Duration) -> CycleReport {
        let mut report = CycleReport::default();

        for component in &self.components {
            let mut guard = match component.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    report.skipped += 1;
                    continue;
                }
            };
            if !guard.state().allows_cycle() {
                report.idle += 1;
                continue;
            }

            if let Err(e) = guard.update_reference(time, period) {
                guard.report_cycle_error(Phase::Reference, e);
                report.errors += 1;
            }
            if let Err(e) = guard.update_and_write(time, period) {
                guard.report_cycle_error(Phase::Write, e);
                report.errors += 1;
            }
            report.updated += 1;
        }

        self.stats.skipped_updates += report.skipped as u64;
        self.stats.cycle_errors += report.errors as u64;
        report
    }

    /// Run the real-time loop.
    ///
    /// This method blocks until the running flag is cleared.
    pub fn run(&mut self) {
        info!(
            "Starting ControlLoop RT loop (cycle_time={}us)...",
            self.cycle_time.as_micros()
        );
        self.running.store(true, Ordering::SeqCst);

        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        let target_us = u64::from(self.config.cycle_time_us);
        let mut last_cycle = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            let dt = cycle_start.duration_since(last_cycle);
            last_cycle = cycle_start;

            self.cycle_once(cycle_start, dt);

            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            self.stats.cycle_count += 1;
            self.stats.total_cycle_time_us += cycle_time_us;
            if cycle_time_us > self.stats.max_cycle_time_us {
                self.stats.max_cycle_time_us = cycle_time_us;
            }

            if cycle_time_us > target_us {
                self.stats.timing_violations += 1;
                if self.stats.timing_violations <= 10 || self.stats.timing_violations % 1000 == 0 {
                    warn!(
                        "Timing violation #{}: cycle took {}us (target {}us)",
                        self.stats.timing_violations, cycle_time_us, target_us
                    );
                }
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }

            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "RT loop: {} cycles, avg={}us, max={}us, violations={}, skipped={}",
                    self.stats.cycle_count,
                    self.stats.total_cycle_time_us / self.stats.cycle_count,
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations,
                    self.stats.skipped_updates
                );
            }
        }

        info!(
            "ControlLoop RT loop stopped after {} cycles (violations: {})",
            self.stats.cycle_count, self.stats.timing_violations
        );
    }

    /// Stop the loop and shut every component down, downstream first.
    ///
    /// Teardown is best-effort: failures are logged and the remaining
    /// components are still shut down.
    pub fn shutdown(&mut self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);

        for component in self.components.iter().rev() {
            let mut component = lock(component);
            if let Some(diag) = component.diagnostics() {
                info!(
                    "{}: accepted={} rejected={} writes={} published={} overwritten={}",
                    component.name(),
                    diag.accepted,
                    diag.rejected,
                    diag.writes,
                    diag.published,
                    diag.overwritten
                );
            }
            if let Err(e) = component.shutdown() {
                warn!("{}: shutdown failed: {}", component.name(), e);
            }
        }
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Get timing statistics.
    pub fn stats(&self) -> TimingStats {
        self.stats
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        let live = self
            .components
            .iter()
            .any(|c| !lock(c).state().is_terminal());
        if live {
            self.shutdown();
        }
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_all_components;
    use relay_common::config::{LogLevel, SharedConfig};
    use relay_common::relay::config::{ComponentConfig, ComponentKind};

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        register_all_components(&mut registry);
        registry
    }

    fn relay_config(components: Vec<ComponentConfig>) -> RelayConfig {
        RelayConfig {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "relay-test".to_string(),
            },
            cycle_time_us: 1000,
            components,
        }
    }

    fn passthrough_loop() -> ControlLoop {
        let config = relay_config(vec![ComponentConfig::new(
            "forward",
            ComponentKind::Passthrough,
            &["j1", "j2"],
        )]);
        let control = ControlLoop::new(config, &registry()).unwrap();
        control.configure_all().unwrap();
        assert_eq!(control.register_hardware_handles(), vec!["j1", "j2"]);
        control.activate_all().unwrap();
        control
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = relay_config(Vec::new());
        config.cycle_time_us = 0;
        assert!(matches!(
            ControlLoop::new(config, &registry()),
            Err(ComponentError::Configuration(_))
        ));
    }

    #[test]
    fn unregistered_kind_is_component_not_found() {
        let config = relay_config(vec![ComponentConfig::new(
            "forward",
            ComponentKind::Passthrough,
            &["j1"],
        )]);
        assert!(matches!(
            ControlLoop::new(config, &ComponentRegistry::new()),
            Err(ComponentError::ComponentNotFound(_))
        ));
    }

    #[test]
    fn cycle_forwards_commands() {
        let mut control = passthrough_loop();
        let sink = lock(&control.component("forward").unwrap())
            .command_sink()
            .unwrap();

        assert!(sink.on_message(&[1.5, -2.0]));
        let report = control.cycle_once(Instant::now(), Duration::from_millis(1));
        assert_eq!(report.updated, 1);
        assert_eq!(report.errors, 0);

        assert_eq!(control.handles().get("j1").unwrap().get(), 1.5);
        assert_eq!(control.handles().get("j2").unwrap().get(), -2.0);
        control.shutdown();
    }

    #[test]
    fn locked_component_is_skipped() {
        let mut control = passthrough_loop();
        let shared = control.component("forward").unwrap();

        let held = lock(&shared);
        let report = control.cycle_once(Instant::now(), Duration::from_millis(1));
        drop(held);

        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(control.stats().skipped_updates, 1);
        control.shutdown();
    }

    #[test]
    fn deactivated_components_are_idle() {
        let mut control = passthrough_loop();
        control.deactivate_all().unwrap();

        let report = control.cycle_once(Instant::now(), Duration::from_millis(1));
        assert_eq!(report.idle, 1);

        control.cleanup_all().unwrap();
        let state = lock(&control.component("forward").unwrap()).state();
        assert_eq!(state, LifecycleState::Unconfigured);
    }

    #[test]
    fn shutdown_releases_exports() {
        let mut control = passthrough_loop();
        assert!(control.handles().get("forward/j1").is_some());
        control.shutdown();
        assert!(control.handles().get("forward/j1").is_none());
        assert_eq!(control.handles().owner_of("j1"), None);
    }
}
