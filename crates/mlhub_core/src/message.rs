//! Domain events exchanged over the broker.
//!
//! Every event travels on exactly one [`Topic`]. Consumers of a topic see its
//! events in delivery order; topics are independent of each other.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MlHubError, Result};
use crate::types::*;

/// Provisioning request emitted after a pending evaluate instance is saved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateInfo {
    pub index: EvaluateIndex,
    /// Input location handed to the backend (aim path or log path).
    pub obs_path: String,
    /// Kept as text so events of a type this build does not know still decode.
    pub evaluate_type: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Like,
    Download,
    Fork,
    RelatedResource,
    Finetune,
    Inference,
    InferenceExtend,
    Evaluate,
    Cloud,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Self::Like,
        Self::Download,
        Self::Fork,
        Self::RelatedResource,
        Self::Finetune,
        Self::Inference,
        Self::InferenceExtend,
        Self::Evaluate,
        Self::Cloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Download => "download",
            Self::Fork => "fork",
            Self::RelatedResource => "related_resource",
            Self::Finetune => "finetune",
            Self::Inference => "inference",
            Self::InferenceExtend => "inference_extend",
            Self::Evaluate => "evaluate",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Event {
    AddRelatedResource(RelatedResource),
    RemoveRelatedResource(RelatedResource),
    AddLike(ResourceObject),
    RemoveLike(ResourceObject),
    Download(ResourceObject),
    Fork(ResourceIndex),
    CreateFinetune(FinetuneIndex),
    CreateInference(InferenceInfo),
    ExtendInferenceSurvivalTime(InferenceExtendInfo),
    CreateEvaluate(EvaluateInfo),
    PodSubscribe(PodInfo),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::AddRelatedResource(_) | Self::RemoveRelatedResource(_) => Topic::RelatedResource,
            Self::AddLike(_) | Self::RemoveLike(_) => Topic::Like,
            Self::Download(_) => Topic::Download,
            Self::Fork(_) => Topic::Fork,
            Self::CreateFinetune(_) => Topic::Finetune,
            Self::CreateInference(_) => Topic::Inference,
            Self::ExtendInferenceSurvivalTime(_) => Topic::InferenceExtend,
            Self::CreateEvaluate(_) => Topic::Evaluate,
            Self::PodSubscribe(_) => Topic::Cloud,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddRelatedResource(_) => "add_related_resource",
            Self::RemoveRelatedResource(_) => "remove_related_resource",
            Self::AddLike(_) => "add_like",
            Self::RemoveLike(_) => "remove_like",
            Self::Download(_) => "download",
            Self::Fork(_) => "fork",
            Self::CreateFinetune(_) => "create_finetune",
            Self::CreateInference(_) => "create_inference",
            Self::ExtendInferenceSurvivalTime(_) => "extend_inference_survival_time",
            Self::CreateEvaluate(_) => "create_evaluate",
            Self::PodSubscribe(_) => "pod_subscribe",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MlHubError::Internal(e.into()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| MlHubError::Internal(e.into()))
    }
}

/// Consumer side of every topic. `dispatch` routes an event to its method.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event_add_related_resource(&self, info: &RelatedResource) -> Result<()>;
    async fn handle_event_remove_related_resource(&self, info: &RelatedResource) -> Result<()>;
    async fn handle_event_add_like(&self, obj: &ResourceObject) -> Result<()>;
    async fn handle_event_remove_like(&self, obj: &ResourceObject) -> Result<()>;
    async fn handle_event_download(&self, obj: &ResourceObject) -> Result<()>;
    async fn handle_event_fork(&self, index: &ResourceIndex) -> Result<()>;
    async fn handle_event_create_finetune(&self, index: &FinetuneIndex) -> Result<()>;
    async fn handle_event_create_inference(&self, info: &InferenceInfo) -> Result<()>;
    async fn handle_event_extend_inference_survival_time(
        &self,
        info: &InferenceExtendInfo,
    ) -> Result<()>;
    async fn handle_event_create_evaluate(&self, info: &EvaluateInfo) -> Result<()>;
    async fn handle_event_pod_subscribe(&self, info: &PodInfo) -> Result<()>;

    /// Whether a service backs `topic`. Unsupported topics are not subscribed.
    fn supports(&self, _topic: Topic) -> bool {
        true
    }

    async fn dispatch(&self, event: &Event) -> Result<()> {
        match event {
            Event::AddRelatedResource(info) => self.handle_event_add_related_resource(info).await,
            Event::RemoveRelatedResource(info) => {
                self.handle_event_remove_related_resource(info).await
            }
            Event::AddLike(obj) => self.handle_event_add_like(obj).await,
            Event::RemoveLike(obj) => self.handle_event_remove_like(obj).await,
            Event::Download(obj) => self.handle_event_download(obj).await,
            Event::Fork(index) => self.handle_event_fork(index).await,
            Event::CreateFinetune(index) => self.handle_event_create_finetune(index).await,
            Event::CreateInference(info) => self.handle_event_create_inference(info).await,
            Event::ExtendInferenceSurvivalTime(info) => {
                self.handle_event_extend_inference_survival_time(info).await
            }
            Event::CreateEvaluate(info) => self.handle_event_create_evaluate(info).await,
            Event::PodSubscribe(info) => self.handle_event_pod_subscribe(info).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate_event() -> Event {
        Event::CreateEvaluate(EvaluateInfo {
            index: EvaluateIndex {
                training: TrainingIndex {
                    project: ResourceIndex::new("alice", "p1"),
                    training_id: "t1".into(),
                },
                id: "e1".into(),
            },
            obs_path: "obs://bucket/aim".into(),
            evaluate_type: EvaluateType::Custom.to_string(),
        })
    }

    #[test]
    fn event_wire_format_is_adjacently_tagged() {
        let bytes = evaluate_event().encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "create_evaluate");
        assert_eq!(json["payload"]["index"]["training_id"], "t1");
        assert_eq!(json["payload"]["index"]["id"], "e1");
    }

    #[test]
    fn like_event_decodes_from_broker_payload() {
        let payload = br#"{"kind":"remove_like","payload":{"owner":"bob","id":"m1","type":"model"}}"#;
        let event = Event::decode(payload).unwrap();
        assert_eq!(event.topic(), Topic::Like);
        assert_eq!(event.kind(), "remove_like");
        match event {
            Event::RemoveLike(obj) => assert_eq!(obj.resource_type, ResourceType::Model),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn garbage_payload_is_an_error() {
        assert!(Event::decode(b"not json").is_err());
    }

    #[test]
    fn every_topic_has_a_distinct_name() {
        let mut names: Vec<_> = Topic::ALL.iter().map(|t| t.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Topic::ALL.len());
    }
}
