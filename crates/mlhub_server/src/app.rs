//! Process wiring shared by the binary and the integration tests.
//!
//! Storage and the resource services are the in-memory adapters; the
//! evaluation backend and the optional finetune/inference/cloud services are
//! supplied by the caller.

use std::sync::Arc;

use axum::Router;
use mlhub_core::handler::{RelationTable, ResourceServices};
use mlhub_core::memory::{MemoryEvaluateRepository, MemoryResourceStore};
use mlhub_core::ports::*;
use mlhub_core::types::ResourceType;
use mlhub_core::{
    EvaluateInternalService, EvaluateProvisioner, EvaluateService, MessageHandler, Result,
    Retrier, Topic,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::{BrokerSender, MemoryBroker};
use crate::config::Config;
use crate::router::build_router;
use crate::subscriber::Subscriber;

/// Collaborators living outside this process.
pub struct ExternalServices {
    pub evaluate_manager: Arc<dyn EvaluateManager>,
    pub finetune: Option<Arc<dyn FinetuneMessageService>>,
    pub inference: Option<Arc<dyn InferenceMessageService>>,
    pub cloud: Option<Arc<dyn CloudMessageService>>,
    pub clock: Arc<dyn Clock>,
}

impl ExternalServices {
    pub fn new(evaluate_manager: Arc<dyn EvaluateManager>) -> Self {
        Self {
            evaluate_manager,
            finetune: None,
            inference: None,
            cloud: None,
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct App {
    pub router: Router,
    pub broker: Arc<MemoryBroker>,
    pub sender: BrokerSender,
    pub repo: Arc<MemoryEvaluateRepository>,
    pub projects: Arc<MemoryResourceStore>,
    pub models: Arc<MemoryResourceStore>,
    pub datasets: Arc<MemoryResourceStore>,
    subscriber: Subscriber,
}

impl App {
    /// Wire every component. `shutdown` cuts retry sleeps short.
    pub fn build(config: &Config, external: ExternalServices, shutdown: watch::Receiver<bool>) -> Self {
        let broker = Arc::new(MemoryBroker::new(
            Topic::ALL.iter().map(|t| config.topics.name(*t).to_string()),
            config.broker.buffer_size,
        ));
        let sender = BrokerSender::new(Arc::clone(&broker), config.topics.clone());

        let repo = Arc::new(MemoryEvaluateRepository::new());
        let projects = Arc::new(MemoryResourceStore::new(ResourceType::Project));
        let models = Arc::new(MemoryResourceStore::new(ResourceType::Model));
        let datasets = Arc::new(MemoryResourceStore::new(ResourceType::Dataset));

        // Request path
        let service = Arc::new(
            EvaluateService::new(
                repo.clone(),
                Arc::new(sender.clone()),
                config.evaluate.min_survival_time,
            )
            .with_clock(Arc::clone(&external.clock)),
        );
        let internal = Arc::new(EvaluateInternalService::new(repo.clone()));
        let router = build_router(service, internal);

        // Event path
        let provisioner = EvaluateProvisioner::new(
            repo.clone(),
            external.evaluate_manager,
            config.evaluate.survival_time,
        )
        .with_clock(external.clock);

        let retrier = Retrier::new(config.max_retry)
            .with_interval(config.retry_interval())
            .with_shutdown(shutdown);

        let resources = ResourceServices {
            project: projects.clone(),
            model: models.clone(),
            dataset: datasets.clone(),
        };
        let relations = RelationTable::new(projects.clone(), models.clone(), datasets.clone());

        let mut handler = MessageHandler::new(retrier, resources, relations, projects.clone())
            .with_evaluate(Arc::new(provisioner));
        if let Some(finetune) = external.finetune {
            handler = handler.with_finetune(finetune, config.finetune_retry_interval());
        }
        if let Some(inference) = external.inference {
            handler = handler.with_inference(inference);
        }
        if let Some(cloud) = external.cloud {
            handler = handler.with_cloud(cloud);
        }

        let subscriber = Subscriber::new(
            Arc::clone(&broker),
            Arc::new(handler),
            config.topics.clone(),
        );

        Self {
            router,
            broker,
            sender,
            repo,
            projects,
            models,
            datasets,
            subscriber,
        }
    }

    /// Start the topic consumers. Call once.
    pub fn spawn_consumers(&self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        self.subscriber.spawn(shutdown)
    }
}
