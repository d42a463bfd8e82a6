use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Scalar aliases ───────────────────────────────────────────

/// Epoch seconds (UTC).
pub type Timestamp = i64;

/// Optimistic concurrency token of an evaluate document.
pub type Version = u64;

// ─── Resources ────────────────────────────────────────────────

/// Platform account name owning a resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three shareable resource kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Project,
    Model,
    Dataset,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [Self::Project, Self::Model, Self::Dataset];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Model => "model",
            Self::Dataset => "dataset",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "model" => Ok(Self::Model),
            "dataset" => Ok(Self::Dataset),
            _ => Err(format!("Unknown resource type: {}", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIndex {
    pub owner: Account,
    pub id: String,
}

impl ResourceIndex {
    pub fn new(owner: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            owner: Account::new(owner),
            id: id.into(),
        }
    }
}

/// A resource index tagged with its kind, as carried by like/download events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(flatten)]
    pub index: ResourceIndex,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

/// `promoter` started referencing (or stopped referencing) `resource`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedResource {
    pub promoter: ResourceObject,
    pub resource: ResourceObject,
}

/// Argument passed to the `add_related` / `remove_related` operations of the
/// domain service owning `resource`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReverselyRelatedResourceInfo {
    pub promoter: ResourceIndex,
    pub resource: ResourceIndex,
}

impl From<&RelatedResource> for ReverselyRelatedResourceInfo {
    fn from(info: &RelatedResource) -> Self {
        Self {
            promoter: info.promoter.index.clone(),
            resource: info.resource.index.clone(),
        }
    }
}

// ─── Evaluate ─────────────────────────────────────────────────

/// A training run of a project.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingIndex {
    pub project: ResourceIndex,
    pub training_id: String,
}

/// Identifies an evaluate instance. `id` is empty until the instance is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateIndex {
    #[serde(flatten)]
    pub training: TrainingIndex,
    #[serde(default)]
    pub id: String,
}

impl EvaluateIndex {
    pub fn new(training: TrainingIndex) -> Self {
        Self {
            training,
            id: String::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluateType {
    Custom,
    Standard,
}

impl EvaluateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for EvaluateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom" => Ok(Self::Custom),
            "standard" => Ok(Self::Standard),
            _ => Err(format!("Unknown evaluate type: {}", s)),
        }
    }
}

/// Candidate values of one hyper-parameter explored by a standard evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluateScope(pub Vec<f64>);

/// Scope parameters of a standard evaluation. Immutable per index once saved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardEvaluateParms {
    pub momentum_scope: EvaluateScope,
    pub batch_size_scope: EvaluateScope,
    pub learning_rate_scope: EvaluateScope,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluate {
    pub index: EvaluateIndex,
    pub evaluate_type: EvaluateType,
    /// Only set for `EvaluateType::Standard`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_parms: Option<StandardEvaluateParms>,
}

/// Outcome fields written once by the provisioner (or the backend callback).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateDetail {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub access_url: String,
    /// Zero until provisioning succeeded.
    #[serde(default)]
    pub expiry: Timestamp,
}

/// Read-only projection of one instance of an index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateSummary {
    pub id: String,
    pub error: String,
    pub access_url: String,
    pub expiry: Timestamp,
}

impl EvaluateSummary {
    /// Provisioning has not recorded an outcome yet.
    pub fn is_pending(&self) -> bool {
        self.error.is_empty() && self.expiry == 0
    }

    /// Live at `now` with at least `min_survival_time` seconds left.
    pub fn is_reusable(&self, now: Timestamp, min_survival_time: i64) -> bool {
        now < self.expiry && now + min_survival_time <= self.expiry
    }
}

// ─── Finetune / inference / cloud ─────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinetuneIndex {
    pub owner: Account,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceIndex {
    pub project: ResourceIndex,
    pub id: String,
    pub last_commit: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceInfo {
    pub index: InferenceIndex,
    pub project_name: String,
    pub resource_level: String,
    /// Seconds.
    pub survival_time: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceExtendInfo {
    pub index: InferenceIndex,
    pub expiry: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub id: String,
    pub cloud_id: String,
    pub owner: Account,
}
