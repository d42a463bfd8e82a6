//! In-process broker: one bounded queue per topic name, one consumer each.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mlhub_core::ports::MessageSender;
use mlhub_core::{EvaluateInfo, Event, MlHubError, Result};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::TopicsConfig;

pub struct MemoryBroker {
    senders: HashMap<String, mpsc::Sender<Vec<u8>>>,
    receivers: Mutex<HashMap<String, mpsc::Receiver<Vec<u8>>>>,
}

impl MemoryBroker {
    pub fn new<I, S>(topics: I, buffer_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for topic in topics {
            let topic = topic.into();
            let (tx, rx) = mpsc::channel(buffer_size.max(1));
            senders.insert(topic.clone(), tx);
            receivers.insert(topic, rx);
        }

        Self {
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    /// Queue `payload` on `topic`. Waits while the queue is full.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let tx = self
            .senders
            .get(topic)
            .ok_or_else(|| MlHubError::Configuration(format!("unknown topic {topic}")))?;

        tx.send(payload)
            .await
            .map_err(|_| MlHubError::Internal(anyhow::anyhow!("topic {topic} has no consumer")))
    }

    /// Take the consumer end of `topic`. A topic has at most one consumer.
    pub fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        let mut receivers = self
            .receivers
            .lock()
            .map_err(|e| MlHubError::Internal(anyhow::anyhow!("Lock: {}", e)))?;

        receivers
            .remove(topic)
            .ok_or_else(|| MlHubError::Configuration(format!("topic {topic} unknown or taken")))
    }
}

/// Producer side used by the services: encodes events and routes them to
/// the configured topic name.
#[derive(Clone)]
pub struct BrokerSender {
    broker: Arc<MemoryBroker>,
    topics: TopicsConfig,
}

impl BrokerSender {
    pub fn new(broker: Arc<MemoryBroker>, topics: TopicsConfig) -> Self {
        Self { broker, topics }
    }

    pub async fn send(&self, event: &Event) -> Result<()> {
        let topic = self.topics.name(event.topic());
        debug!(topic, kind = event.kind(), "publishing event");
        self.broker.publish(topic, event.encode()?).await
    }
}

#[async_trait]
impl MessageSender for BrokerSender {
    async fn create_evaluate(&self, info: &EvaluateInfo) -> Result<()> {
        self.send(&Event::CreateEvaluate(info.clone())).await
    }
}
