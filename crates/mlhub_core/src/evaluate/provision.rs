//! EvaluateProvisioner: consumer of `create_evaluate` events.
//!
//! Starts the instance on the evaluation backend and records its expiry. A
//! failed attempt writes nothing, so the instance stays pending for the next
//! attempt of the retry loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::message::EvaluateInfo;
use crate::ports::*;
use crate::types::*;

pub struct EvaluateProvisioner {
    repo: Arc<dyn EvaluateRepository>,
    manager: Arc<dyn EvaluateManager>,
    clock: Arc<dyn Clock>,
    /// Seconds an instance lives once started.
    survival_time: i64,
}

impl EvaluateProvisioner {
    pub fn new(
        repo: Arc<dyn EvaluateRepository>,
        manager: Arc<dyn EvaluateManager>,
        survival_time: i64,
    ) -> Self {
        Self {
            repo,
            manager,
            clock: Arc::new(SystemClock),
            survival_time,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl EvaluateMessageService for EvaluateProvisioner {
    async fn create_evaluate_instance(&self, info: &EvaluateInfo) -> Result<()> {
        // Expiry counts from before the backend call.
        let expiry = self.clock.now() + self.survival_time;

        let Ok(evaluate_type) = info.evaluate_type.parse::<EvaluateType>() else {
            debug!(
                evaluate_id = %info.index.id,
                evaluate_type = %info.evaluate_type,
                "ignoring evaluate event of unknown type"
            );
            return Ok(());
        };

        let standard_parms = match evaluate_type {
            EvaluateType::Custom => None,
            EvaluateType::Standard => {
                Some(self.repo.get_standard_evaluate_parms(&info.index).await?)
            }
        };

        self.manager
            .create(&EvaluateCreateRequest {
                evaluate: Evaluate {
                    index: info.index.clone(),
                    evaluate_type,
                    standard_parms,
                },
                source_path: info.obs_path.clone(),
                survival_time: self.survival_time,
            })
            .await?;

        self.repo
            .update_detail(
                &info.index,
                &EvaluateDetail {
                    expiry,
                    ..Default::default()
                },
            )
            .await?;

        info!(
            owner = %info.index.training.project.owner,
            training_id = %info.index.training.training_id,
            evaluate_id = %info.index.id,
            expiry,
            "evaluate instance provisioned"
        );
        Ok(())
    }
}
