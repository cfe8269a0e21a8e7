//! Broker port - synchronous send with acknowledgment (Kafka, NATS, ...)

use async_trait::async_trait;

use crate::domain::BrokerError;

/// Broker delivers a payload to a topic.
///
/// # 設計原則
/// - `send` resolves only once the broker has acknowledged the message.
///   Fire-and-forget producers do not satisfy this port.
/// - No deduplication key is attached. Consumers must tolerate duplicates.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
}
