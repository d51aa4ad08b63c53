//! Callback producer.
//!
//! A `CommandSubscriber` is handed to a message transport, which calls
//! [`CommandSink::on_message`] on its own thread for every inbound command.

use super::RecordPublisher;
use crate::handoff::{HandoffProducer, HandoffStats};
use relay_common::relay::component::CommandSink;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable, `Send` callback handle feeding one handoff buffer.
#[derive(Debug, Clone)]
pub struct CommandSubscriber {
    publisher: Arc<Mutex<RecordPublisher>>,
}

impl CommandSubscriber {
    /// Subscriber for `component` accepting records of `axis_count` values.
    pub fn new(component: &str, axis_count: usize, producer: HandoffProducer) -> Self {
        Self {
            publisher: Arc::new(Mutex::new(RecordPublisher::new(
                component, axis_count, producer,
            ))),
        }
    }

    fn publisher(&self) -> MutexGuard<'_, RecordPublisher> {
        self.publisher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records discarded for having the wrong length.
    pub fn rejected(&self) -> u64 {
        self.publisher().rejected()
    }

    /// Counters of the underlying buffer.
    pub fn handoff_stats(&self) -> HandoffStats {
        self.publisher().handoff_stats()
    }
}

impl CommandSink for CommandSubscriber {
    fn on_message(&self, values: &[f64]) -> bool {
        self.publisher().offer(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::handoff;
    use std::thread;

    #[test]
    fn clones_share_one_buffer() {
        let (tx, mut rx) = handoff(2);
        let subscriber = CommandSubscriber::new("relay", 2, tx);
        let other = subscriber.clone();

        assert!(subscriber.on_message(&[1.0, 2.0]));
        assert!(other.on_message(&[3.0, 4.0]));
        assert_eq!(rx.try_consume().unwrap().as_slice(), &[3.0, 4.0]);
        assert_eq!(subscriber.handoff_stats().overwritten, 1);
    }

    #[test]
    fn callback_from_transport_thread() {
        let (tx, mut rx) = handoff(1);
        let subscriber = CommandSubscriber::new("relay", 1, tx);

        let transport = subscriber.clone();
        thread::spawn(move || {
            assert!(!transport.on_message(&[1.0, 2.0]));
            assert!(transport.on_message(&[5.0]));
        })
        .join()
        .unwrap();

        assert_eq!(rx.try_consume().unwrap().as_slice(), &[5.0]);
        assert_eq!(subscriber.rejected(), 1);
    }
}
