//! Port traits. Core logic depends only on these; storage, transport and the
//! compute backends live behind them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::EvaluateInfo;
use crate::types::*;

// ── Clock ─────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock in epoch seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

// ── Evaluate storage ──────────────────────────────────────────

/// Persistence of evaluate instances. All instances of one training run share
/// a document guarded by a single optimistic `Version`.
#[async_trait]
pub trait EvaluateRepository: Send + Sync {
    /// Persist a new pending instance. Fails with `DuplicateCreating` when the
    /// document moved past `version` since it was read. Returns the new instance id.
    async fn save(&self, evaluate: &Evaluate, version: Version) -> Result<String>;

    /// The instance addressed by `index.id`.
    async fn find_instance(&self, index: &EvaluateIndex) -> Result<EvaluateSummary>;

    /// Every instance of the training run, in storage order, plus the current version.
    async fn find_instances(
        &self,
        project: &ResourceIndex,
        training_id: &str,
    ) -> Result<(Vec<EvaluateSummary>, Version)>;

    async fn update_detail(&self, index: &EvaluateIndex, detail: &EvaluateDetail) -> Result<()>;

    async fn get_standard_evaluate_parms(
        &self,
        index: &EvaluateIndex,
    ) -> Result<StandardEvaluateParms>;
}

// ── Outbound messages ─────────────────────────────────────────

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn create_evaluate(&self, info: &EvaluateInfo) -> Result<()>;
}

// ── Provisioning capability ───────────────────────────────────

/// What the evaluation backend needs to start an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluateCreateRequest {
    pub evaluate: Evaluate,
    pub source_path: String,
    /// Seconds.
    pub survival_time: i64,
}

#[async_trait]
pub trait EvaluateManager: Send + Sync {
    async fn create(&self, req: &EvaluateCreateRequest) -> Result<()>;
}

// ── Domain message services ───────────────────────────────────

/// Counters every shareable resource kind exposes to the event consumers.
#[async_trait]
pub trait ResourceMessageService: Send + Sync {
    async fn add_like(&self, index: &ResourceIndex) -> Result<()>;
    async fn remove_like(&self, index: &ResourceIndex) -> Result<()>;
    async fn increase_download(&self, index: &ResourceIndex) -> Result<()>;
}

/// Reverse relations kept by the service owning `info.resource`; `related`
/// is the kind of `info.promoter`.
#[async_trait]
pub trait RelatedResourceService: Send + Sync {
    async fn add_related(
        &self,
        related: ResourceType,
        info: &ReverselyRelatedResourceInfo,
    ) -> Result<()>;

    async fn remove_related(
        &self,
        related: ResourceType,
        info: &ReverselyRelatedResourceInfo,
    ) -> Result<()>;
}

#[async_trait]
pub trait ForkService: Send + Sync {
    async fn increase_fork(&self, index: &ResourceIndex) -> Result<()>;
}

#[async_trait]
pub trait FinetuneMessageService: Send + Sync {
    /// Errors that are not `is_retryable()` are final for this job; the
    /// scheduler behind the service retries on its own.
    async fn create_finetune_job(&self, index: &FinetuneIndex, last_chance: bool) -> Result<()>;
}

#[async_trait]
pub trait InferenceMessageService: Send + Sync {
    async fn create_inference_instance(&self, info: &InferenceInfo) -> Result<()>;
    async fn extend_survival_time(&self, info: &InferenceExtendInfo) -> Result<()>;
}

#[async_trait]
pub trait CloudMessageService: Send + Sync {
    async fn create_pod_instance(&self, info: &PodInfo) -> Result<()>;
}

#[async_trait]
pub trait EvaluateMessageService: Send + Sync {
    async fn create_evaluate_instance(&self, info: &EvaluateInfo) -> Result<()>;
}
