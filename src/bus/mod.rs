//! Message-bus side of the bridge.

pub mod backoff;
pub mod mqtt;

use std::sync::{Mutex, PoisonError};

pub use backoff::ReconnectBackoff;
pub use mqtt::{BusError, MqttBridge};

/// Outbound half of the bus as seen by the protocol engine.
///
/// Publishing is fire-and-forget: implementations queue the message and
/// return without waiting for delivery.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>);
}

/// Publisher that keeps every message in memory. Used where no broker is
/// available (tests, dry runs).
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), payload));
    }
}
