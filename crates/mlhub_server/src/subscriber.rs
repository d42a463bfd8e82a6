//! Topic consumers.
//!
//! One task per supported topic drains its queue in order and hands each
//! event to the [`EventHandler`]. The handler runs to completion (retries
//! included) before the next event of the same topic is taken.

use std::sync::Arc;

use mlhub_core::{Event, EventHandler, Result, Topic};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::MemoryBroker;
use crate::config::TopicsConfig;

pub struct Subscriber {
    broker: Arc<MemoryBroker>,
    handler: Arc<dyn EventHandler>,
    topics: TopicsConfig,
}

impl Subscriber {
    pub fn new(
        broker: Arc<MemoryBroker>,
        handler: Arc<dyn EventHandler>,
        topics: TopicsConfig,
    ) -> Self {
        Self {
            broker,
            handler,
            topics,
        }
    }

    /// Start a consumer for every topic the handler supports.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        for topic in Topic::ALL {
            if !self.handler.supports(topic) {
                debug!(%topic, "no service wired, not subscribing");
                continue;
            }

            let name = self.topics.name(topic).to_string();
            let rx = self.broker.subscribe(&name)?;
            let handler = Arc::clone(&self.handler);
            let shutdown = shutdown.clone();

            info!(%topic, name = %name, "subscribed");
            handles.push(tokio::spawn(consume(topic, rx, handler, shutdown)));
        }

        Ok(handles)
    }
}

async fn consume(
    topic: Topic,
    mut rx: mpsc::Receiver<Vec<u8>>,
    handler: Arc<dyn EventHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let payload = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        handle_payload(topic, &payload, handler.as_ref()).await;
    }

    info!(%topic, "consumer stopped");
}

async fn handle_payload(topic: Topic, payload: &[u8], handler: &dyn EventHandler) {
    let event = match Event::decode(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(%topic, error = %e, "dropping undecodable event");
            return;
        }
    };

    if event.topic() != topic {
        warn!(%topic, kind = event.kind(), "event published on a foreign topic");
    }

    match handler.dispatch(&event).await {
        Ok(()) => debug!(%topic, kind = event.kind(), "event handled"),
        Err(e) => error!(%topic, kind = event.kind(), error = %e, "event handling failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mlhub_core::message::EvaluateInfo;
    use mlhub_core::types::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn record(&self, what: String) -> Result<()> {
            self.seen.lock().unwrap().push(what);
            Ok(())
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle_event_add_related_resource(&self, _: &RelatedResource) -> Result<()> {
            self.record("add_related".into())
        }
        async fn handle_event_remove_related_resource(&self, _: &RelatedResource) -> Result<()> {
            self.record("remove_related".into())
        }
        async fn handle_event_add_like(&self, obj: &ResourceObject) -> Result<()> {
            self.record(format!("like {}", obj.index.id))
        }
        async fn handle_event_remove_like(&self, obj: &ResourceObject) -> Result<()> {
            self.record(format!("unlike {}", obj.index.id))
        }
        async fn handle_event_download(&self, _: &ResourceObject) -> Result<()> {
            self.record("download".into())
        }
        async fn handle_event_fork(&self, _: &ResourceIndex) -> Result<()> {
            self.record("fork".into())
        }
        async fn handle_event_create_finetune(&self, _: &FinetuneIndex) -> Result<()> {
            self.record("finetune".into())
        }
        async fn handle_event_create_inference(&self, _: &InferenceInfo) -> Result<()> {
            self.record("inference".into())
        }
        async fn handle_event_extend_inference_survival_time(
            &self,
            _: &InferenceExtendInfo,
        ) -> Result<()> {
            self.record("extend".into())
        }
        async fn handle_event_create_evaluate(&self, _: &EvaluateInfo) -> Result<()> {
            self.record("evaluate".into())
        }
        async fn handle_event_pod_subscribe(&self, _: &PodInfo) -> Result<()> {
            self.record("pod".into())
        }

        fn supports(&self, topic: Topic) -> bool {
            topic != Topic::Cloud
        }
    }

    fn like(id: &str) -> Vec<u8> {
        Event::AddLike(ResourceObject {
            index: ResourceIndex::new("alice", id),
            resource_type: ResourceType::Model,
        })
        .encode()
        .unwrap()
    }

    fn broker() -> Arc<MemoryBroker> {
        let topics = TopicsConfig::default();
        Arc::new(MemoryBroker::new(
            Topic::ALL.iter().map(|t| topics.name(*t).to_string()),
            16,
        ))
    }

    #[tokio::test]
    async fn events_are_handled_in_order_and_garbage_is_skipped() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        let (tx, rx) = watch::channel(false);

        let subscriber = Subscriber::new(broker.clone(), handler.clone(), TopicsConfig::default());
        let handles = subscriber.spawn(rx).unwrap();

        broker.publish("like", like("m1")).await.unwrap();
        broker.publish("like", b"{not json".to_vec()).await.unwrap();
        broker.publish("like", like("m2")).await.unwrap();

        while handler.seen.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*handler.seen.lock().unwrap(), vec!["like m1", "like m2"]);
    }

    #[tokio::test]
    async fn unsupported_topic_is_left_unsubscribed() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        let (_tx, rx) = watch::channel(false);

        let handles = Subscriber::new(broker.clone(), handler, TopicsConfig::default())
            .spawn(rx)
            .unwrap();

        assert_eq!(handles.len(), Topic::ALL.len() - 1);
        // The cloud queue is still available to another consumer.
        assert!(broker.subscribe("cloud").is_ok());
        assert!(broker.subscribe("like").is_err());
    }
}
