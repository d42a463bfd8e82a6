//! Evaluate endpoints, all under
//! `/evaluate/project/:owner/:pid/training/:tid`.
//!
//! POST .../custom               create or reuse a custom evaluation
//! POST .../standard             create or reuse a standard evaluation
//! GET  .../evaluate/:id         current state of one instance
//! PUT  .../evaluate/:id/detail  backend callback recording the outcome

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use mlhub_core::types::{
    EvaluateDetail, EvaluateIndex, EvaluateScope, ResourceIndex, TrainingIndex,
};
use mlhub_core::{
    CustomEvaluateCreateCmd, EvaluateDto, EvaluateInternalService, EvaluateService,
    StandardEvaluateCreateCmd,
};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CustomEvaluateRequest {
    #[serde(default)]
    pub aim_path: String,
}

#[derive(Debug, Deserialize)]
pub struct StandardEvaluateRequest {
    #[serde(default)]
    pub log_path: String,
    #[serde(default)]
    pub momentum_scope: EvaluateScope,
    #[serde(default)]
    pub batch_size_scope: EvaluateScope,
    #[serde(default)]
    pub learning_rate_scope: EvaluateScope,
}

fn training(owner: String, pid: String, tid: String) -> TrainingIndex {
    TrainingIndex {
        project: ResourceIndex::new(owner, pid),
        training_id: tid,
    }
}

pub async fn create_custom(
    Extension(service): Extension<Arc<EvaluateService>>,
    Path((owner, pid, tid)): Path<(String, String, String)>,
    Json(req): Json<CustomEvaluateRequest>,
) -> Result<Json<EvaluateDto>, AppError> {
    let cmd = CustomEvaluateCreateCmd {
        training: training(owner, pid, tid),
        aim_path: req.aim_path,
    };
    let dto = service.create_custom(&cmd).await?;
    Ok(Json(dto))
}

pub async fn create_standard(
    Extension(service): Extension<Arc<EvaluateService>>,
    Path((owner, pid, tid)): Path<(String, String, String)>,
    Json(req): Json<StandardEvaluateRequest>,
) -> Result<Json<EvaluateDto>, AppError> {
    let cmd = StandardEvaluateCreateCmd {
        training: training(owner, pid, tid),
        log_path: req.log_path,
        momentum_scope: req.momentum_scope,
        batch_size_scope: req.batch_size_scope,
        learning_rate_scope: req.learning_rate_scope,
    };
    let dto = service.create_standard(&cmd).await?;
    Ok(Json(dto))
}

pub async fn get(
    Extension(service): Extension<Arc<EvaluateService>>,
    Path((owner, pid, tid, id)): Path<(String, String, String, String)>,
) -> Result<Json<EvaluateDto>, AppError> {
    let index = EvaluateIndex {
        training: training(owner, pid, tid),
        id,
    };
    let dto = service.get(&index).await?;
    Ok(Json(dto))
}

pub async fn update_detail(
    Extension(internal): Extension<Arc<EvaluateInternalService>>,
    Path((owner, pid, tid, id)): Path<(String, String, String, String)>,
    Json(detail): Json<EvaluateDetail>,
) -> Result<StatusCode, AppError> {
    let index = EvaluateIndex {
        training: training(owner, pid, tid),
        id,
    };
    internal.update_detail(&index, &detail).await?;
    Ok(StatusCode::NO_CONTENT)
}
