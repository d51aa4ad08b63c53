//! Producer adapters: the non-real-time side of the handoff buffer.
//!
//! A producer turns values from an external source into command records.
//! Every variant goes through a [`RecordPublisher`], which discards records
//! whose length differs from the axis count before they reach the buffer.
//!
//! - [`subscriber`] - Callback variant driven by a message transport
//! - [`socket`] - Background thread reading text lines from a TCP peer

pub mod socket;
pub mod subscriber;

use crate::handoff::{HandoffProducer, HandoffStats};
use crate::throttle::LogThrottle;
use relay_common::consts::DIAGNOSTIC_THROTTLE_MS;
use relay_common::relay::component::ComponentError;
use relay_common::relay::types::CommandRecord;
use std::io;
use std::net::SocketAddr;
use std::num::ParseFloatError;
use thiserror::Error;
use tracing::{debug, warn};

pub use socket::SocketProducer;
pub use subscriber::CommandSubscriber;

/// Errors starting a producer.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Bind address could not be parsed.
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    /// Listener socket could not be created, bound or configured.
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Receiver thread could not be spawned.
    #[error("Failed to spawn receiver thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<ProducerError> for ComponentError {
    fn from(err: ProducerError) -> Self {
        match err {
            ProducerError::InvalidAddress(_) => ComponentError::Configuration(err.to_string()),
            _ => ComponentError::ResourceAcquisition(err.to_string()),
        }
    }
}

/// Shape gate in front of a [`HandoffProducer`].
#[derive(Debug)]
pub struct RecordPublisher {
    component: String,
    axis_count: usize,
    producer: HandoffProducer,
    reject_throttle: LogThrottle,
    rejected: u64,
}

impl RecordPublisher {
    /// Publisher for `component`, accepting records of `axis_count` values.
    pub fn new(component: &str, axis_count: usize, producer: HandoffProducer) -> Self {
        Self {
            component: component.to_string(),
            axis_count,
            producer,
            reject_throttle: LogThrottle::from_millis(DIAGNOSTIC_THROTTLE_MS),
            rejected: 0,
        }
    }

    /// Owning component name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Expected record length.
    pub fn axis_count(&self) -> usize {
        self.axis_count
    }

    /// Publish `values` if the length matches, otherwise discard them.
    ///
    /// Returns `true` if the record was published. A discarded record
    /// leaves the buffer untouched.
    pub fn offer(&mut self, values: &[f64]) -> bool {
        if values.len() != self.axis_count {
            self.rejected += 1;
            if let Some(suppressed) = self.reject_throttle.ready() {
                warn!(
                    "{}: command size ({}) does not match number of axes ({}), discarded ({} similar suppressed)",
                    self.component,
                    values.len(),
                    self.axis_count,
                    suppressed
                );
            }
            return false;
        }

        match self.producer.publish_slice(values) {
            Ok(()) => {
                debug!("{}: published {:?}", self.component, values);
                true
            }
            Err(e) => {
                self.rejected += 1;
                warn!("{}: {}", self.component, e);
                false
            }
        }
    }

    /// Publish an explicit "no command" record.
    pub fn publish_sentinel(&self) {
        self.producer
            .publish(&CommandRecord::sentinel(self.axis_count));
    }

    /// Records discarded so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Counters of the underlying buffer.
    pub fn handoff_stats(&self) -> HandoffStats {
        self.producer.stats()
    }
}

/// Parse one text command: numbers separated by whitespace and/or commas.
///
/// `nan` is accepted and yields a sentinel entry.
pub fn parse_command_line(line: &str) -> Result<Vec<f64>, ParseFloatError> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(str::parse::<f64>)
        .collect()
}
