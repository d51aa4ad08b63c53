//! Position feedback sensor implementation.
//!
//! The velocity arrives over TCP through a [`SocketProducer`] and crosses
//! the handoff buffer into a one-axis relay. Phase 2 integrates
//! `position += velocity * dt / slowdown` and writes the position handle.
//!
//! A sentinel velocity means no fresh measurement. Under
//! [`StalenessPolicy::Latch`] the last measured velocity keeps being
//! integrated; under [`StalenessPolicy::Reset`] integration stops.
//! Activation and deactivation drop the latched velocity.

use crate::components::{claim_outputs, count_down, export_references};
use crate::handoff::{HandoffProducer, handoff};
use crate::producer::RecordPublisher;
use crate::producer::socket::{ReceiverSettings, SocketProducer};
use crate::relay::{ReferenceRelay, RelayUpdate};
use relay_common::lifecycle::LifecycleState;
use relay_common::relay::component::{
    ComponentDiagnostics, ComponentError, CycleError, RtComponent,
};
use relay_common::relay::config::{ComponentConfig, ComponentKind, StalenessPolicy};
use relay_common::relay::handles::{HandleRegistry, InterfaceHandle};
use relay_common::relay::types::CommandRecord;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Socket-fed single-axis sensor.
pub struct PositionFeedbackSensor {
    name: String,
    output_name: String,
    staleness: StalenessPolicy,
    slowdown: f64,
    start_delay: Duration,
    stop_delay: Duration,
    relay: Option<ReferenceRelay>,
    producer: Option<HandoffProducer>,
    receiver: Option<SocketProducer>,
    /// Exported measured velocity, `"<name>/<joint>"`
    velocity: Option<InterfaceHandle>,
    /// Claimed position handle, present while active
    output: Option<InterfaceHandle>,
    position: f64,
    last_velocity: f64,
    accepted: u64,
    rejected: u64,
    writes: u64,
}

impl PositionFeedbackSensor {
    /// Create an unconfigured sensor.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            output_name: String::new(),
            staleness: StalenessPolicy::default(),
            slowdown: 1.0,
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            relay: None,
            producer: None,
            receiver: None,
            velocity: None,
            output: None,
            position: 0.0,
            last_velocity: 0.0,
            accepted: 0,
            rejected: 0,
            writes: 0,
        }
    }

    /// Address the receiver listens on, once configured.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(SocketProducer::local_addr)
    }

    /// Integrated position.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Velocity currently being integrated.
    pub fn velocity(&self) -> f64 {
        self.last_velocity
    }

    fn reset_to_sentinel(&mut self) {
        self.last_velocity = 0.0;
        if let (Some(relay), Some(producer)) = (self.relay.as_mut(), self.producer.as_ref()) {
            producer.force_set(&CommandRecord::sentinel(1));
            relay.reset();
        }
    }
}

impl RtComponent for PositionFeedbackSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::PositionFeedback
    }

    fn on_configure(
        &mut self,
        config: &ComponentConfig,
        handles: &HandleRegistry,
    ) -> Result<(), ComponentError> {
        config.validate()?;
        if config.kind != ComponentKind::PositionFeedback {
            return Err(ComponentError::Configuration(format!(
                "{}: expected kind position_feedback, got {}",
                self.name,
                config.kind.as_str()
            )));
        }
        let Some(socket) = config.socket.as_ref() else {
            return Err(ComponentError::Configuration(format!(
                "{}: missing [socket] table",
                self.name
            )));
        };
        let output_name = config
            .command_interface_names()
            .first()
            .cloned()
            .ok_or_else(|| ComponentError::Configuration(format!("{}: no interface", self.name)))?;

        let (producer, consumer) = handoff(1);
        let publisher = RecordPublisher::new(&self.name, 1, producer.clone());
        let settings = ReceiverSettings {
            poll_period: socket.poll_period(),
            staleness: config.staleness,
            start_delay: socket.start_delay(),
        };

        let mut exported = export_references(handles, &self.name, &config.interfaces)?;
        let receiver = match SocketProducer::start(socket, settings, publisher) {
            Ok(receiver) => receiver,
            Err(e) => {
                handles.unexport_all(&self.name);
                return Err(e.into());
            }
        };

        self.output_name = output_name;
        self.staleness = config.staleness;
        self.slowdown = config.slowdown;
        self.start_delay = config.start_delay();
        self.stop_delay = config.stop_delay();
        self.relay = Some(ReferenceRelay::new(consumer, 1));
        self.producer = Some(producer);
        self.receiver = Some(receiver);
        self.velocity = exported.pop();
        self.position = 0.0;
        self.last_velocity = 0.0;

        info!("{}: configuration successful", self.name);
        Ok(())
    }

    fn on_activate(&mut self, handles: &HandleRegistry) -> Result<(), ComponentError> {
        count_down(&self.name, "Activating", self.start_delay);

        self.reset_to_sentinel();
        let mut claimed = claim_outputs(handles, &self.name, std::slice::from_ref(&self.output_name))?;
        self.output = claimed.pop();

        info!("{}: successfully activated", self.name);
        Ok(())
    }

    fn on_deactivate(&mut self, handles: &HandleRegistry) -> Result<(), ComponentError> {
        count_down(&self.name, "Deactivating", self.stop_delay);

        self.reset_to_sentinel();
        self.output = None;
        handles.release_all(&self.name);

        info!("{}: successfully deactivated", self.name);
        Ok(())
    }

    fn on_cleanup(&mut self, handles: &HandleRegistry) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }
        self.output = None;
        self.velocity = None;
        self.producer = None;
        self.relay = None;
        handles.release_all(&self.name);
        handles.unexport_all(&self.name);
        debug!("{}: cleanup complete", self.name);
    }

    fn update_reference(&mut self, _time: Instant, _period: Duration) -> Result<(), CycleError> {
        let relay = self
            .relay
            .as_mut()
            .ok_or(CycleError::NotActive(LifecycleState::Unconfigured))?;
        match relay.pull() {
            Ok(RelayUpdate::NoNewRecord) => {}
            Ok(RelayUpdate::Applied | RelayUpdate::Reset) => self.accepted += 1,
            Err(e) => {
                self.rejected += 1;
                return Err(e);
            }
        }

        let measured = relay.references()[0];
        if measured.is_finite() {
            self.last_velocity = measured;
        } else if self.staleness == StalenessPolicy::Reset {
            self.last_velocity = 0.0;
        }
        Ok(())
    }

    fn update_and_write(&mut self, _time: Instant, period: Duration) -> Result<(), CycleError> {
        if self.relay.is_none() {
            return Err(CycleError::NotActive(LifecycleState::Unconfigured));
        }

        self.position += self.last_velocity * period.as_secs_f64() / self.slowdown;
        if let Some(velocity) = &self.velocity {
            velocity.set(self.last_velocity);
        }
        if let Some(output) = &self.output {
            output.set(self.position);
            self.writes += 1;
        }
        Ok(())
    }

    fn diagnostics(&self) -> Option<ComponentDiagnostics> {
        let stats = self.relay.as_ref().map(ReferenceRelay::handoff_stats)?;
        Some(ComponentDiagnostics {
            accepted: self.accepted,
            rejected: self.rejected,
            writes: self.writes,
            published: stats.published,
            overwritten: stats.overwritten,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::relay::config::SocketConfig;

    fn config() -> ComponentConfig {
        let mut config = ComponentConfig::new("feedback", ComponentKind::PositionFeedback, &["joint1"]);
        config.command_interfaces = vec!["joint1/position".to_string()];
        config.socket = Some(SocketConfig {
            port: 0,
            bind_address: "127.0.0.1".to_string(),
            poll_period_ms: 1,
            start_delay_ms: 0,
        });
        config
    }

    #[test]
    fn configure_starts_receiver_and_cleanup_stops_it() {
        let handles = HandleRegistry::new();
        let mut sensor = PositionFeedbackSensor::new("feedback");

        sensor.on_configure(&config(), &handles).unwrap();
        assert!(sensor.local_addr().is_some());
        assert!(handles.get("feedback/joint1").is_some());

        sensor.on_cleanup(&handles);
        assert!(sensor.local_addr().is_none());
        assert!(handles.get("feedback/joint1").is_none());
        sensor.on_cleanup(&handles);
    }

    #[test]
    fn missing_socket_table_is_rejected() {
        let handles = HandleRegistry::new();
        let mut sensor = PositionFeedbackSensor::new("feedback");
        let mut config = config();
        config.socket = None;
        assert!(matches!(
            sensor.on_configure(&config, &handles),
            Err(ComponentError::Configuration(_))
        ));
    }

    #[test]
    fn velocity_is_integrated_with_slowdown() {
        let handles = HandleRegistry::new();
        let position = handles.register("joint1/position", 0.0).unwrap();
        let mut sensor = PositionFeedbackSensor::new("feedback");
        let mut config = config();
        config.slowdown = 2.0;
        sensor.on_configure(&config, &handles).unwrap();
        sensor.on_activate(&handles).unwrap();

        let now = Instant::now();
        let dt = Duration::from_millis(500);
        // Consumes the activation sentinel.
        sensor.update_reference(now, dt).unwrap();

        sensor.relay.as_mut().unwrap().apply(&[4.0]).unwrap();
        sensor.update_reference(now, dt).unwrap();
        sensor.update_and_write(now, dt).unwrap();

        assert!((position.get() - 1.0).abs() < 1e-12);
        assert_eq!(handles.get("feedback/joint1").unwrap().get(), 4.0);
        sensor.on_cleanup(&handles);
    }

    #[test]
    fn reactivation_does_not_integrate_previous_velocity() {
        let handles = HandleRegistry::new();
        let position = handles.register("joint1/position", 0.0).unwrap();
        let mut sensor = PositionFeedbackSensor::new("feedback");
        sensor.on_configure(&config(), &handles).unwrap();
        sensor.on_activate(&handles).unwrap();

        let now = Instant::now();
        let dt = Duration::from_millis(500);
        sensor.update_reference(now, dt).unwrap();
        sensor.relay.as_mut().unwrap().apply(&[4.0]).unwrap();
        sensor.update_reference(now, dt).unwrap();
        sensor.update_and_write(now, dt).unwrap();
        assert_eq!(position.get(), 2.0);

        sensor.on_deactivate(&handles).unwrap();
        sensor.on_activate(&handles).unwrap();
        let before = position.get();
        sensor.update_reference(now, dt).unwrap();
        sensor.update_and_write(now, dt).unwrap();

        assert_eq!(sensor.velocity(), 0.0);
        assert_eq!(position.get(), before);
        sensor.on_cleanup(&handles);
    }
}
