//! EvaluateService: create-or-reuse of evaluate instances.
//!
//! `create` reads every instance of the training run together with the
//! document version, decides between reusing, reporting a failure, or
//! creating, and persists a new pending instance under that version. A
//! concurrent creator makes the save fail with `DuplicateCreating`; the loser
//! re-reads and returns what the winner stored.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MlHubError, Result};
use crate::message::EvaluateInfo;
use crate::ports::{Clock, EvaluateRepository, MessageSender, SystemClock};
use crate::types::*;

// ── Commands ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomEvaluateCreateCmd {
    pub training: TrainingIndex,
    pub aim_path: String,
}

impl CustomEvaluateCreateCmd {
    pub fn validate(&self) -> Result<()> {
        validate_training(&self.training)?;
        if self.aim_path.is_empty() {
            return Err(MlHubError::Validation("empty aim path".into()));
        }
        Ok(())
    }

    fn to_evaluate(&self) -> Evaluate {
        Evaluate {
            index: EvaluateIndex::new(self.training.clone()),
            evaluate_type: EvaluateType::Custom,
            standard_parms: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardEvaluateCreateCmd {
    pub training: TrainingIndex,
    pub log_path: String,
    #[serde(default)]
    pub momentum_scope: EvaluateScope,
    #[serde(default)]
    pub batch_size_scope: EvaluateScope,
    #[serde(default)]
    pub learning_rate_scope: EvaluateScope,
}

impl StandardEvaluateCreateCmd {
    pub fn validate(&self) -> Result<()> {
        validate_training(&self.training)?;
        if self.log_path.is_empty() {
            return Err(MlHubError::Validation("empty log path".into()));
        }
        Ok(())
    }

    fn to_evaluate(&self) -> Evaluate {
        Evaluate {
            index: EvaluateIndex::new(self.training.clone()),
            evaluate_type: EvaluateType::Standard,
            standard_parms: Some(StandardEvaluateParms {
                momentum_scope: self.momentum_scope.clone(),
                batch_size_scope: self.batch_size_scope.clone(),
                learning_rate_scope: self.learning_rate_scope.clone(),
            }),
        }
    }
}

fn validate_training(training: &TrainingIndex) -> Result<()> {
    if training.project.id.is_empty() {
        return Err(MlHubError::Validation("empty project id".into()));
    }
    if training.project.owner.is_empty() {
        return Err(MlHubError::Validation("empty project owner".into()));
    }
    if training.training_id.is_empty() {
        return Err(MlHubError::Validation("empty training id".into()));
    }
    Ok(())
}

// ── DTO ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateDto {
    pub error: String,
    pub access_url: String,
    #[serde(rename = "evaluate_id")]
    pub instance_id: String,
}

impl EvaluateDto {
    pub fn has_result(&self) -> bool {
        !self.instance_id.is_empty()
    }
}

impl From<EvaluateSummary> for EvaluateDto {
    fn from(s: EvaluateSummary) -> Self {
        Self {
            error: s.error,
            access_url: s.access_url,
            instance_id: s.id,
        }
    }
}

/// Reuse policy over the summaries of one training run, in storage order.
///
/// The first failed summary is reported. Otherwise the summary with the
/// latest expiry (first seen on ties) is returned if it is reusable at `now`.
/// An empty DTO means a new instance must be created.
pub fn decide(summaries: &[EvaluateSummary], now: Timestamp, min_survival_time: i64) -> EvaluateDto {
    let mut target: Option<&EvaluateSummary> = None;

    for item in summaries {
        if !item.error.is_empty() {
            return EvaluateDto {
                error: item.error.clone(),
                access_url: String::new(),
                instance_id: item.id.clone(),
            };
        }

        if target.map_or(true, |t| item.expiry > t.expiry) {
            target = Some(item);
        }
    }

    match target {
        Some(t) if t.is_reusable(now, min_survival_time) => EvaluateDto {
            error: String::new(),
            access_url: t.access_url.clone(),
            instance_id: t.id.clone(),
        },
        _ => EvaluateDto::default(),
    }
}

// ── EvaluateService ───────────────────────────────────────────

pub struct EvaluateService {
    repo: Arc<dyn EvaluateRepository>,
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
    min_survival_time: i64,
}

impl EvaluateService {
    pub fn new(
        repo: Arc<dyn EvaluateRepository>,
        sender: Arc<dyn MessageSender>,
        min_survival_time: i64,
    ) -> Self {
        Self {
            repo,
            sender,
            clock: Arc::new(SystemClock),
            min_survival_time,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn create_custom(&self, cmd: &CustomEvaluateCreateCmd) -> Result<EvaluateDto> {
        cmd.validate()?;
        self.create(cmd.to_evaluate(), &cmd.aim_path).await
    }

    pub async fn create_standard(&self, cmd: &StandardEvaluateCreateCmd) -> Result<EvaluateDto> {
        cmd.validate()?;
        self.create(cmd.to_evaluate(), &cmd.log_path).await
    }

    /// Current snapshot of one instance.
    pub async fn get(&self, index: &EvaluateIndex) -> Result<EvaluateDto> {
        self.repo.find_instance(index).await.map(EvaluateDto::from)
    }

    async fn create(&self, mut evaluate: Evaluate, path: &str) -> Result<EvaluateDto> {
        let training = evaluate.index.training.clone();

        let (dto, version) = self.check(&training).await?;
        if dto.has_result() {
            debug!(
                owner = %training.project.owner,
                training_id = %training.training_id,
                evaluate_id = %dto.instance_id,
                failed = !dto.error.is_empty(),
                "evaluate instance reused"
            );
            return Ok(dto);
        }

        let id = match self.repo.save(&evaluate, version).await {
            Ok(id) => id,
            Err(e) if e.is_duplicate_creating() => {
                debug!(
                    owner = %training.project.owner,
                    training_id = %training.training_id,
                    "lost evaluate creation race, re-reading"
                );
                return self.reconcile(&training).await;
            }
            Err(e) => return Err(e),
        };
        evaluate.index.id = id.clone();

        info!(
            owner = %training.project.owner,
            training_id = %training.training_id,
            evaluate_id = %id,
            evaluate_type = %evaluate.evaluate_type,
            "evaluate instance created"
        );

        self.sender
            .create_evaluate(&EvaluateInfo {
                index: evaluate.index,
                obs_path: path.to_string(),
                evaluate_type: evaluate.evaluate_type.to_string(),
            })
            .await?;

        Ok(EvaluateDto {
            instance_id: id,
            ..Default::default()
        })
    }

    async fn check(&self, training: &TrainingIndex) -> Result<(EvaluateDto, Version)> {
        let (summaries, version) = self
            .repo
            .find_instances(&training.project, &training.training_id)
            .await?;

        let dto = decide(&summaries, self.clock.now(), self.min_survival_time);
        Ok((dto, version))
    }

    /// After a lost race the winner's instance is usually still pending, which
    /// `decide` does not report. The newest pending instance is the winner.
    async fn reconcile(&self, training: &TrainingIndex) -> Result<EvaluateDto> {
        let (summaries, _) = self
            .repo
            .find_instances(&training.project, &training.training_id)
            .await?;

        let dto = decide(&summaries, self.clock.now(), self.min_survival_time);
        if dto.has_result() {
            return Ok(dto);
        }

        match summaries.iter().rev().find(|s| s.is_pending()) {
            Some(winner) => Ok(EvaluateDto {
                instance_id: winner.id.clone(),
                ..Default::default()
            }),
            None => {
                warn!(
                    owner = %training.project.owner,
                    training_id = %training.training_id,
                    "creation race lost but no instance of the winner found"
                );
                Ok(EvaluateDto::default())
            }
        }
    }
}

// ── EvaluateInternalService ───────────────────────────────────

/// Write path for the evaluation backend's callback.
pub struct EvaluateInternalService {
    repo: Arc<dyn EvaluateRepository>,
}

impl EvaluateInternalService {
    pub fn new(repo: Arc<dyn EvaluateRepository>) -> Self {
        Self { repo }
    }

    pub async fn update_detail(&self, index: &EvaluateIndex, detail: &EvaluateDetail) -> Result<()> {
        self.repo.update_detail(index, detail).await
    }
}
