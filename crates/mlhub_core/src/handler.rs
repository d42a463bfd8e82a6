//! MessageHandler: routes consumed domain events to the owning services,
//! each call wrapped by the [`Retrier`].
//!
//! Routing tables are assembled once at startup:
//! - single-resource events (like, download) pick a service by resource kind;
//! - related-resource events look up the `(promoter, resource)` pair in a
//!   [`RelationTable`] holding the six valid cross-kind relations.
//!
//! A service reporting `ResourceNotExists` means the resource was deleted
//! while its event was in flight; those events are logged and acknowledged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{MlHubError, Result};
use crate::message::{EvaluateInfo, EventHandler, Topic};
use crate::ports::*;
use crate::retry::Retrier;
use crate::types::*;

/// Interval between finetune creation attempts.
pub const FINETUNE_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Valid `(promoter, resource)` pairs. Same-kind pairs are not relations.
pub const RELATIONS: [(ResourceType, ResourceType); 6] = [
    (ResourceType::Model, ResourceType::Dataset),
    (ResourceType::Project, ResourceType::Dataset),
    (ResourceType::Project, ResourceType::Model),
    (ResourceType::Dataset, ResourceType::Model),
    (ResourceType::Model, ResourceType::Project),
    (ResourceType::Dataset, ResourceType::Project),
];

// ── Routing tables ────────────────────────────────────────────

/// Like/download services per resource kind.
#[derive(Clone)]
pub struct ResourceServices {
    pub project: Arc<dyn ResourceMessageService>,
    pub model: Arc<dyn ResourceMessageService>,
    pub dataset: Arc<dyn ResourceMessageService>,
}

impl ResourceServices {
    pub fn get(&self, resource_type: ResourceType) -> &Arc<dyn ResourceMessageService> {
        match resource_type {
            ResourceType::Project => &self.project,
            ResourceType::Model => &self.model,
            ResourceType::Dataset => &self.dataset,
        }
    }
}

/// `(promoter, resource)` → service owning `resource`.
#[derive(Clone)]
pub struct RelationTable {
    handlers: HashMap<(ResourceType, ResourceType), Arc<dyn RelatedResourceService>>,
}

impl RelationTable {
    pub fn new(
        project: Arc<dyn RelatedResourceService>,
        model: Arc<dyn RelatedResourceService>,
        dataset: Arc<dyn RelatedResourceService>,
    ) -> Self {
        let handlers = RELATIONS
            .iter()
            .map(|&(promoter, resource)| {
                let owner = match resource {
                    ResourceType::Project => Arc::clone(&project),
                    ResourceType::Model => Arc::clone(&model),
                    ResourceType::Dataset => Arc::clone(&dataset),
                };
                ((promoter, resource), owner)
            })
            .collect();

        Self { handlers }
    }

    pub fn lookup(
        &self,
        promoter: ResourceType,
        resource: ResourceType,
    ) -> Result<&Arc<dyn RelatedResourceService>> {
        self.handlers
            .get(&(promoter, resource))
            .ok_or(MlHubError::UnknownRelation { promoter, resource })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ── MessageHandler ────────────────────────────────────────────

pub struct MessageHandler {
    retrier: Retrier,
    finetune_interval: Duration,
    resources: ResourceServices,
    relations: RelationTable,
    forks: Arc<dyn ForkService>,
    evaluate: Option<Arc<dyn EvaluateMessageService>>,
    finetune: Option<Arc<dyn FinetuneMessageService>>,
    inference: Option<Arc<dyn InferenceMessageService>>,
    cloud: Option<Arc<dyn CloudMessageService>>,
}

impl MessageHandler {
    pub fn new(
        retrier: Retrier,
        resources: ResourceServices,
        relations: RelationTable,
        forks: Arc<dyn ForkService>,
    ) -> Self {
        Self {
            retrier,
            finetune_interval: FINETUNE_RETRY_INTERVAL,
            resources,
            relations,
            forks,
            evaluate: None,
            finetune: None,
            inference: None,
            cloud: None,
        }
    }

    pub fn with_evaluate(mut self, evaluate: Arc<dyn EvaluateMessageService>) -> Self {
        self.evaluate = Some(evaluate);
        self
    }

    pub fn with_finetune(
        mut self,
        finetune: Arc<dyn FinetuneMessageService>,
        interval: Duration,
    ) -> Self {
        self.finetune = Some(finetune);
        self.finetune_interval = interval;
        self
    }

    pub fn with_inference(mut self, inference: Arc<dyn InferenceMessageService>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudMessageService>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    async fn handle_related(&self, info: &RelatedResource, add: bool) -> Result<()> {
        let promoter = info.promoter.resource_type;
        let service = self.relations.lookup(promoter, info.resource.resource_type)?;
        let data = ReverselyRelatedResourceInfo::from(info);
        let data = &data;

        self.retrier
            .run(|_| async move {
                if add {
                    service.add_related(promoter, data).await
                } else {
                    service.remove_related(promoter, data).await
                }
            })
            .await
    }
}

fn not_wired(topic: Topic) -> MlHubError {
    MlHubError::Configuration(format!("no service wired for topic {topic}"))
}

/// Acknowledge events whose resource was deleted concurrently.
fn ignore_not_exists(result: Result<()>, op: &str, index: &ResourceIndex) -> Result<()> {
    match result {
        Err(e) if e.is_resource_not_exists() => {
            error!(
                owner = %index.owner,
                rid = %index.id,
                error = %e,
                "handle event of {op}: resource no longer exists"
            );
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    async fn handle_event_add_related_resource(&self, info: &RelatedResource) -> Result<()> {
        self.handle_related(info, true).await
    }

    async fn handle_event_remove_related_resource(&self, info: &RelatedResource) -> Result<()> {
        self.handle_related(info, false).await
    }

    async fn handle_event_add_like(&self, obj: &ResourceObject) -> Result<()> {
        let service = self.resources.get(obj.resource_type);
        let index = &obj.index;

        self.retrier
            .run(|_| async move {
                ignore_not_exists(service.add_like(index).await, "adding like", index)
            })
            .await
    }

    async fn handle_event_remove_like(&self, obj: &ResourceObject) -> Result<()> {
        let service = self.resources.get(obj.resource_type);
        let index = &obj.index;

        self.retrier
            .run(|_| async move {
                ignore_not_exists(service.remove_like(index).await, "removing like", index)
            })
            .await
    }

    async fn handle_event_download(&self, obj: &ResourceObject) -> Result<()> {
        let service = self.resources.get(obj.resource_type);
        let index = &obj.index;

        self.retrier
            .run(|_| async move {
                ignore_not_exists(service.increase_download(index).await, "download", index)
            })
            .await
    }

    async fn handle_event_fork(&self, index: &ResourceIndex) -> Result<()> {
        let forks = &self.forks;

        self.retrier
            .run(|_| async move {
                ignore_not_exists(forks.increase_fork(index).await, "fork", index)
            })
            .await
    }

    async fn handle_event_create_finetune(&self, index: &FinetuneIndex) -> Result<()> {
        let finetune = self.finetune.as_ref().ok_or_else(|| not_wired(Topic::Finetune))?;
        debug!(owner = %index.owner, id = %index.id, "start handle finetune");

        self.retrier
            .retry(
                |last_chance| async move {
                    match finetune.create_finetune_job(index, last_chance).await {
                        Ok(()) => Ok(()),
                        Err(e) => {
                            error!(
                                owner = %index.owner,
                                id = %index.id,
                                last_chance,
                                error = %e,
                                "handle finetune failed"
                            );
                            if e.is_retryable() {
                                Err(e)
                            } else {
                                Ok(())
                            }
                        }
                    }
                },
                self.finetune_interval,
            )
            .await
    }

    async fn handle_event_create_inference(&self, info: &InferenceInfo) -> Result<()> {
        let inference = self.inference.as_ref().ok_or_else(|| not_wired(Topic::Inference))?;

        self.retrier
            .run(|_| async move {
                let result = inference.create_inference_instance(info).await;
                if let Err(e) = &result {
                    error!(
                        owner = %info.index.project.owner,
                        inference_id = %info.index.id,
                        error = %e,
                        "create inference instance failed"
                    );
                }
                result
            })
            .await
    }

    async fn handle_event_extend_inference_survival_time(
        &self,
        info: &InferenceExtendInfo,
    ) -> Result<()> {
        let inference = self
            .inference
            .as_ref()
            .ok_or_else(|| not_wired(Topic::InferenceExtend))?;

        self.retrier
            .run(|_| async move {
                let result = inference.extend_survival_time(info).await;
                if let Err(e) = &result {
                    error!(
                        inference_id = %info.index.id,
                        expiry = info.expiry,
                        error = %e,
                        "extend inference survival time failed"
                    );
                }
                result
            })
            .await
    }

    async fn handle_event_create_evaluate(&self, info: &EvaluateInfo) -> Result<()> {
        let evaluate = self.evaluate.as_ref().ok_or_else(|| not_wired(Topic::Evaluate))?;

        self.retrier
            .run(|_| async move {
                let result = evaluate.create_evaluate_instance(info).await;
                if let Err(e) = &result {
                    error!(
                        owner = %info.index.training.project.owner,
                        training_id = %info.index.training.training_id,
                        evaluate_id = %info.index.id,
                        error = %e,
                        "create evaluate instance failed"
                    );
                }
                result
            })
            .await
    }

    async fn handle_event_pod_subscribe(&self, info: &PodInfo) -> Result<()> {
        let cloud = self.cloud.as_ref().ok_or_else(|| not_wired(Topic::Cloud))?;

        // Pod failures are recorded by the cloud service itself; never retried here.
        self.retrier
            .run(|_| async move {
                if let Err(e) = cloud.create_pod_instance(info).await {
                    error!(pod_id = %info.id, cloud_id = %info.cloud_id, error = %e, "create pod instance failed");
                }
                Ok(())
            })
            .await
    }

    fn supports(&self, topic: Topic) -> bool {
        match topic {
            Topic::Like | Topic::Download | Topic::Fork | Topic::RelatedResource => true,
            Topic::Finetune => self.finetune.is_some(),
            Topic::Inference | Topic::InferenceExtend => self.inference.is_some(),
            Topic::Evaluate => self.evaluate.is_some(),
            Topic::Cloud => self.cloud.is_some(),
        }
    }
}
