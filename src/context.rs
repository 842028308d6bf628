use std::sync::Arc;

use crate::bus::EventPublisher;
use crate::downlink_queue::DownlinkQueue;
use crate::gateway::{GatewayIdentity, TopicSet};
use crate::translator::Translator;

/// Everything the packet handlers need, built once at startup.
pub struct BridgeContext {
    pub identity: GatewayIdentity,
    pub topics: TopicSet,
    pub queue: Arc<DownlinkQueue>,
    pub translator: Translator,
    pub publisher: Arc<dyn EventPublisher>,
}

impl BridgeContext {
    pub fn new(
        identity: GatewayIdentity,
        topics: TopicSet,
        queue: Arc<DownlinkQueue>,
        translator: Translator,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            identity,
            topics,
            queue,
            translator,
            publisher,
        }
    }

    pub(crate) fn publish(&self, topic: &str, payload: Vec<u8>) {
        tracing::debug!("Publishing {} bytes to {}", payload.len(), topic);
        self.publisher.publish(topic, payload);
    }
}
