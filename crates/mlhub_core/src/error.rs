use thiserror::Error;

use crate::types::ResourceType;

pub type Result<T> = std::result::Result<T, MlHubError>;

#[derive(Debug, Error)]
pub enum MlHubError {
    #[error("invalid cmd: {0}")]
    Validation(String),

    /// Optimistic write lost against a concurrent creator of the same index.
    #[error("duplicate creating: {0}")]
    DuplicateCreating(String),

    #[error("resource not exists: {0}")]
    ResourceNotExists(String),

    #[error("provisioning failed: {message}")]
    Provisioning { message: String, retryable: bool },

    #[error("unknown reversely related resource: {promoter} -> {resource}")]
    UnknownRelation {
        promoter: ResourceType,
        resource: ResourceType,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MlHubError {
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent_provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_duplicate_creating(&self) -> bool {
        matches!(self, Self::DuplicateCreating(_))
    }

    pub fn is_resource_not_exists(&self) -> bool {
        matches!(self, Self::ResourceNotExists(_))
    }

    /// Whether another attempt could succeed. Validation, relation and
    /// configuration failures are permanent classifications.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provisioning { retryable, .. } => *retryable,
            Self::Internal(_) => true,
            Self::Validation(_)
            | Self::DuplicateCreating(_)
            | Self::ResourceNotExists(_)
            | Self::UnknownRelation { .. }
            | Self::Configuration(_) => false,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::DuplicateCreating(_) => 409,
            Self::ResourceNotExists(_) => 404,
            Self::Provisioning { .. } => 502,
            Self::UnknownRelation { .. } => 422,
            Self::Configuration(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}
