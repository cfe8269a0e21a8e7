//! InMemoryBroker - 開発用の Broker
//!
//! Records every acknowledged delivery. Can be switched offline, made slow,
//! or told to reject a topic, which is enough to drive the outbox through its
//! failure paths.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::BrokerError;
use crate::ports::Broker;

/// A message the broker acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    offline: bool,
    latency: Option<Duration>,
    rejected_topics: HashSet<String>,
    deliveries: Vec<Delivery>,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_online(&self, online: bool) {
        self.state.lock().await.offline = !online;
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    pub async fn reject_topic(&self, topic: impl Into<String>) {
        self.state.lock().await.rejected_topics.insert(topic.into());
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.state.lock().await.deliveries.clone()
    }

    pub async fn deliveries_for(&self, topic: &str) -> Vec<Delivery> {
        self.state
            .lock()
            .await
            .deliveries
            .iter()
            .filter(|d| d.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.offline {
            return Err(BrokerError::Unavailable("broker is offline".to_string()));
        }
        if state.rejected_topics.contains(topic) {
            return Err(BrokerError::Rejected {
                topic: topic.to_string(),
                reason: "topic is not writable".to_string(),
            });
        }
        state.deliveries.push(Delivery {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_acknowledged_sends() {
        let broker = InMemoryBroker::new();
        broker.send("orders", b"a").await.unwrap();
        broker.send("billing", b"b").await.unwrap();

        assert_eq!(broker.deliveries().await.len(), 2);
        let orders = broker.deliveries_for("orders").await;
        assert_eq!(orders, vec![Delivery { topic: "orders".into(), payload: b"a".to_vec() }]);
    }

    #[tokio::test]
    async fn offline_broker_refuses_and_records_nothing() {
        let broker = InMemoryBroker::new();
        broker.set_online(false).await;
        let err = broker.send("orders", b"a").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert!(broker.deliveries().await.is_empty());

        broker.set_online(true).await;
        broker.send("orders", b"a").await.unwrap();
        assert_eq!(broker.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn rejected_topic() {
        let broker = InMemoryBroker::new();
        broker.reject_topic("audit").await;
        let err = broker.send("audit", b"x").await.unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { ref topic, .. } if topic == "audit"));
        assert!(!err.is_transient());
    }
}
