//! Passthrough controller implementation.
//!
//! The `PassthroughController` implements `RtComponent`: commands arrive
//! through a [`CommandSubscriber`], cross the handoff buffer, and are
//! written unchanged to the configured command handles.

use crate::components::{claim_outputs, count_down, export_references};
use crate::handoff::{HandoffProducer, handoff};
use crate::producer::CommandSubscriber;
use crate::relay::{ReferenceRelay, RelayUpdate};
use relay_common::lifecycle::LifecycleState;
use relay_common::relay::component::{
    CommandSink, ComponentDiagnostics, ComponentError, CycleError, RtComponent,
};
use relay_common::relay::config::{ComponentConfig, ComponentKind};
use relay_common::relay::handles::{HandleRegistry, InterfaceHandle};
use relay_common::relay::types::CommandRecord;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Chainable controller forwarding per-axis commands.
pub struct PassthroughController {
    /// Instance name
    name: String,
    /// Handle names written in phase 2
    command_names: Vec<String>,
    /// Relay state, present between configure and cleanup
    relay: Option<ReferenceRelay>,
    /// Management-side writer for sentinel resets
    producer: Option<HandoffProducer>,
    /// Transport-facing callback handle
    subscriber: Option<CommandSubscriber>,
    /// Claimed command handles, present while active
    outputs: Vec<InterfaceHandle>,
    /// Simulated (de)activation delays
    start_delay: Duration,
    stop_delay: Duration,
    /// Counters
    accepted: u64,
    rejected: u64,
    writes: u64,
}

impl PassthroughController {
    /// Create an unconfigured controller.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            command_names: Vec::new(),
            relay: None,
            producer: None,
            subscriber: None,
            outputs: Vec::new(),
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            accepted: 0,
            rejected: 0,
            writes: 0,
        }
    }

    /// Callback handle for the message transport, once configured.
    pub fn subscriber(&self) -> Option<&CommandSubscriber> {
        self.subscriber.as_ref()
    }

    /// Current relay state (empty before configure).
    pub fn references(&self) -> &[f64] {
        self.relay.as_ref().map(ReferenceRelay::references).unwrap_or(&[])
    }

    fn reset_to_sentinel(&mut self) {
        if let (Some(relay), Some(producer)) = (self.relay.as_mut(), self.producer.as_ref()) {
            producer.force_set(&CommandRecord::sentinel(relay.axis_count()));
            relay.reset();
        }
    }
}

impl RtComponent for PassthroughController {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Passthrough
    }

    fn on_configure(
        &mut self,
        config: &ComponentConfig,
        handles: &HandleRegistry,
    ) -> Result<(), ComponentError> {
        config.validate()?;
        if config.kind != ComponentKind::Passthrough {
            return Err(ComponentError::Configuration(format!(
                "{}: expected kind passthrough, got {}",
                self.name,
                config.kind.as_str()
            )));
        }

        let axis_count = config.axis_count();
        let references = export_references(handles, &self.name, &config.interfaces)?;

        let (producer, consumer) = handoff(axis_count);
        let mut relay = ReferenceRelay::new(consumer, axis_count);
        relay.set_chained_inputs(references);
        relay.set_chained(config.chained);

        self.subscriber = Some(CommandSubscriber::new(&self.name, axis_count, producer.clone()));
        self.producer = Some(producer);
        self.relay = Some(relay);
        self.command_names = config.command_interface_names().to_vec();
        self.start_delay = config.start_delay();
        self.stop_delay = config.stop_delay();

        info!(
            "{}: configure successful ({} axes, chained={})",
            self.name, axis_count, config.chained
        );
        Ok(())
    }

    fn on_activate(&mut self, handles: &HandleRegistry) -> Result<(), ComponentError> {
        count_down(&self.name, "Activating", self.start_delay);

        // A command may have arrived while inactive.
        self.reset_to_sentinel();
        self.outputs = claim_outputs(handles, &self.name, &self.command_names)?;

        info!("{}: activate successful", self.name);
        Ok(())
    }

    fn on_deactivate(&mut self, handles: &HandleRegistry) -> Result<(), ComponentError> {
        count_down(&self.name, "Deactivating", self.stop_delay);

        self.reset_to_sentinel();
        self.outputs.clear();
        handles.release_all(&self.name);

        info!("{}: deactivate successful", self.name);
        Ok(())
    }

    fn on_cleanup(&mut self, handles: &HandleRegistry) {
        self.outputs.clear();
        self.subscriber = None;
        self.producer = None;
        self.relay = None;
        let released = handles.release_all(&self.name);
        let removed = handles.unexport_all(&self.name);
        debug!(
            "{}: cleanup released {} claims, removed {} references",
            self.name, released, removed
        );
    }

    fn update_reference(&mut self, _time: Instant, _period: Duration) -> Result<(), CycleError> {
        let relay = self
            .relay
            .as_mut()
            .ok_or(CycleError::NotActive(LifecycleState::Unconfigured))?;
        match relay.pull() {
            Ok(RelayUpdate::NoNewRecord) => Ok(()),
            Ok(RelayUpdate::Applied | RelayUpdate::Reset) => {
                self.accepted += 1;
                Ok(())
            }
            Err(e) => {
                self.rejected += 1;
                Err(e)
            }
        }
    }

    fn update_and_write(&mut self, _time: Instant, _period: Duration) -> Result<(), CycleError> {
        let relay = self
            .relay
            .as_ref()
            .ok_or(CycleError::NotActive(LifecycleState::Unconfigured))?;
        if relay.write(&self.outputs) > 0 {
            self.writes += 1;
        }
        Ok(())
    }

    fn is_chainable(&self) -> bool {
        true
    }

    fn set_chained_mode(&mut self, chained: bool) -> bool {
        self.relay
            .as_mut()
            .is_some_and(|relay| relay.set_chained(chained))
    }

    fn is_in_chained_mode(&self) -> bool {
        self.relay.as_ref().is_some_and(ReferenceRelay::is_chained)
    }

    fn references_mut(&mut self) -> Option<&mut [f64]> {
        self.relay.as_mut().map(ReferenceRelay::references_mut)
    }

    fn command_sink(&self) -> Option<Arc<dyn CommandSink>> {
        self.subscriber
            .clone()
            .map(|subscriber| Arc::new(subscriber) as Arc<dyn CommandSink>)
    }

    fn diagnostics(&self) -> Option<ComponentDiagnostics> {
        let stats = self.relay.as_ref().map(ReferenceRelay::handoff_stats)?;
        Some(ComponentDiagnostics {
            accepted: self.accepted,
            rejected: self.rejected + self.subscriber.as_ref().map_or(0, CommandSubscriber::rejected),
            writes: self.writes,
            published: stats.published,
            overwritten: stats.overwritten,
        })
    }
}
