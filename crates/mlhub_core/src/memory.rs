//! In-memory port implementations for tests and the single-process server.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{MlHubError, Result};
use crate::ports::*;
use crate::types::*;

// ── ManualClock ──

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

// ── MemoryEvaluateRepository ──

#[derive(Clone, Debug)]
struct StoredInstance {
    id: String,
    evaluate_type: EvaluateType,
    standard_parms: Option<StandardEvaluateParms>,
    detail: EvaluateDetail,
}

impl StoredInstance {
    fn summary(&self) -> EvaluateSummary {
        EvaluateSummary {
            id: self.id.clone(),
            error: self.detail.error.clone(),
            access_url: self.detail.access_url.clone(),
            expiry: self.detail.expiry,
        }
    }
}

/// All instances of one training run. `version` bumps on every save.
#[derive(Debug, Default)]
struct EvaluateDocument {
    version: Version,
    instances: Vec<StoredInstance>,
}

/// Evaluate storage keyed by training run. Instances are kept in insertion
/// order, which is the order `find_instances` reports them in.
#[derive(Debug, Default)]
pub struct MemoryEvaluateRepository {
    docs: RwLock<HashMap<TrainingIndex, EvaluateDocument>>,
}

impl MemoryEvaluateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances stored for a training run.
    pub async fn count(&self, training: &TrainingIndex) -> usize {
        self.docs
            .read()
            .await
            .get(training)
            .map_or(0, |doc| doc.instances.len())
    }
}

fn not_found(index: &EvaluateIndex) -> MlHubError {
    MlHubError::ResourceNotExists(format!(
        "evaluate {}/{}/{}/{}",
        index.training.project.owner, index.training.project.id, index.training.training_id, index.id
    ))
}

#[async_trait]
impl EvaluateRepository for MemoryEvaluateRepository {
    async fn save(&self, evaluate: &Evaluate, version: Version) -> Result<String> {
        let mut docs = self.docs.write().await;
        let doc = docs.entry(evaluate.index.training.clone()).or_default();

        if doc.version != version {
            return Err(MlHubError::DuplicateCreating(format!(
                "training {} moved from version {} to {}",
                evaluate.index.training.training_id, version, doc.version
            )));
        }

        let id = Uuid::new_v4().to_string();
        doc.instances.push(StoredInstance {
            id: id.clone(),
            evaluate_type: evaluate.evaluate_type,
            standard_parms: evaluate.standard_parms.clone(),
            detail: EvaluateDetail::default(),
        });
        doc.version += 1;

        Ok(id)
    }

    async fn find_instance(&self, index: &EvaluateIndex) -> Result<EvaluateSummary> {
        let docs = self.docs.read().await;
        docs.get(&index.training)
            .and_then(|doc| doc.instances.iter().find(|i| i.id == index.id))
            .map(StoredInstance::summary)
            .ok_or_else(|| not_found(index))
    }

    async fn find_instances(
        &self,
        project: &ResourceIndex,
        training_id: &str,
    ) -> Result<(Vec<EvaluateSummary>, Version)> {
        let key = TrainingIndex {
            project: project.clone(),
            training_id: training_id.to_string(),
        };
        let docs = self.docs.read().await;
        Ok(match docs.get(&key) {
            Some(doc) => (
                doc.instances.iter().map(StoredInstance::summary).collect(),
                doc.version,
            ),
            None => (Vec::new(), 0),
        })
    }

    /// Non-empty fields of `detail` overwrite the stored ones, so the
    /// provisioner's expiry and the backend callback's URL can land in
    /// either order.
    async fn update_detail(&self, index: &EvaluateIndex, detail: &EvaluateDetail) -> Result<()> {
        let mut docs = self.docs.write().await;
        let instance = docs
            .get_mut(&index.training)
            .and_then(|doc| doc.instances.iter_mut().find(|i| i.id == index.id))
            .ok_or_else(|| not_found(index))?;

        if !detail.error.is_empty() {
            instance.detail.error = detail.error.clone();
        }
        if !detail.access_url.is_empty() {
            instance.detail.access_url = detail.access_url.clone();
        }
        if detail.expiry != 0 {
            instance.detail.expiry = detail.expiry;
        }
        Ok(())
    }

    async fn get_standard_evaluate_parms(
        &self,
        index: &EvaluateIndex,
    ) -> Result<StandardEvaluateParms> {
        let docs = self.docs.read().await;
        docs.get(&index.training)
            .and_then(|doc| doc.instances.iter().find(|i| i.id == index.id))
            .filter(|i| i.evaluate_type == EvaluateType::Standard)
            .and_then(|i| i.standard_parms.clone())
            .ok_or_else(|| not_found(index))
    }
}

// ── MemoryResourceStore ──

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounters {
    pub like_count: i64,
    pub download_count: i64,
    pub fork_count: i64,
    /// `(promoter kind, promoter owner, promoter id)` of resources referencing this one.
    pub related: BTreeSet<(ResourceType, String, String)>,
}

/// Like/download/fork counters and reverse relations of one resource kind.
#[derive(Debug)]
pub struct MemoryResourceStore {
    kind: ResourceType,
    resources: RwLock<HashMap<ResourceIndex, ResourceCounters>>,
}

impl MemoryResourceStore {
    pub fn new(kind: ResourceType) -> Self {
        Self {
            kind,
            resources: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, index: ResourceIndex) {
        self.resources.write().await.entry(index).or_default();
    }

    pub async fn remove(&self, index: &ResourceIndex) {
        self.resources.write().await.remove(index);
    }

    pub async fn counters(&self, index: &ResourceIndex) -> Option<ResourceCounters> {
        self.resources.read().await.get(index).cloned()
    }

    async fn update<F>(&self, index: &ResourceIndex, f: F) -> Result<()>
    where
        F: FnOnce(&mut ResourceCounters),
    {
        let mut resources = self.resources.write().await;
        let counters = resources.get_mut(index).ok_or_else(|| {
            MlHubError::ResourceNotExists(format!("{} {}/{}", self.kind, index.owner, index.id))
        })?;
        f(counters);
        Ok(())
    }
}

#[async_trait]
impl ResourceMessageService for MemoryResourceStore {
    async fn add_like(&self, index: &ResourceIndex) -> Result<()> {
        self.update(index, |c| c.like_count += 1).await
    }

    async fn remove_like(&self, index: &ResourceIndex) -> Result<()> {
        self.update(index, |c| c.like_count = (c.like_count - 1).max(0))
            .await
    }

    async fn increase_download(&self, index: &ResourceIndex) -> Result<()> {
        self.update(index, |c| c.download_count += 1).await
    }
}

#[async_trait]
impl RelatedResourceService for MemoryResourceStore {
    async fn add_related(
        &self,
        related: ResourceType,
        info: &ReverselyRelatedResourceInfo,
    ) -> Result<()> {
        let entry = (
            related,
            info.promoter.owner.to_string(),
            info.promoter.id.clone(),
        );
        self.update(&info.resource, |c| {
            c.related.insert(entry);
        })
        .await
    }

    async fn remove_related(
        &self,
        related: ResourceType,
        info: &ReverselyRelatedResourceInfo,
    ) -> Result<()> {
        let entry = (
            related,
            info.promoter.owner.to_string(),
            info.promoter.id.clone(),
        );
        self.update(&info.resource, |c| {
            c.related.remove(&entry);
        })
        .await
    }
}

#[async_trait]
impl ForkService for MemoryResourceStore {
    async fn increase_fork(&self, index: &ResourceIndex) -> Result<()> {
        self.update(index, |c| c.fork_count += 1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training() -> TrainingIndex {
        TrainingIndex {
            project: ResourceIndex::new("alice", "p1"),
            training_id: "t1".into(),
        }
    }

    fn custom() -> Evaluate {
        Evaluate {
            index: EvaluateIndex::new(training()),
            evaluate_type: EvaluateType::Custom,
            standard_parms: None,
        }
    }

    #[tokio::test]
    async fn save_with_stale_version_is_a_duplicate() {
        let repo = MemoryEvaluateRepository::new();
        let (_, version) = repo.find_instances(&training().project, "t1").await.unwrap();
        assert_eq!(version, 0);

        repo.save(&custom(), version).await.unwrap();
        let err = repo.save(&custom(), version).await.unwrap_err();

        assert!(err.is_duplicate_creating());
        assert_eq!(repo.count(&training()).await, 1);
    }

    #[tokio::test]
    async fn instances_are_listed_in_insertion_order() {
        let repo = MemoryEvaluateRepository::new();
        let first = repo.save(&custom(), 0).await.unwrap();
        let second = repo.save(&custom(), 1).await.unwrap();

        let (summaries, version) = repo.find_instances(&training().project, "t1").await.unwrap();
        let ids: Vec<_> = summaries.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn update_detail_merges_fields() {
        let repo = MemoryEvaluateRepository::new();
        let mut index = EvaluateIndex::new(training());
        index.id = repo.save(&custom(), 0).await.unwrap();

        repo.update_detail(
            &index,
            &EvaluateDetail {
                access_url: "https://eval/1".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        repo.update_detail(
            &index,
            &EvaluateDetail {
                expiry: 500,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let summary = repo.find_instance(&index).await.unwrap();
        assert_eq!(summary.access_url, "https://eval/1");
        assert_eq!(summary.expiry, 500);
    }

    #[tokio::test]
    async fn missing_instance_is_not_found() {
        let repo = MemoryEvaluateRepository::new();
        let mut index = EvaluateIndex::new(training());
        index.id = "nope".into();

        assert!(repo.find_instance(&index).await.unwrap_err().is_resource_not_exists());
        assert!(repo
            .update_detail(&index, &EvaluateDetail::default())
            .await
            .unwrap_err()
            .is_resource_not_exists());
    }

    #[tokio::test]
    async fn custom_instance_has_no_standard_parms() {
        let repo = MemoryEvaluateRepository::new();
        let mut index = EvaluateIndex::new(training());
        index.id = repo.save(&custom(), 0).await.unwrap();

        let err = repo.get_standard_evaluate_parms(&index).await.unwrap_err();
        assert!(err.is_resource_not_exists());
    }

    #[tokio::test]
    async fn resource_store_counts_and_relates() {
        let store = MemoryResourceStore::new(ResourceType::Dataset);
        let d1 = ResourceIndex::new("bob", "d1");
        store.insert(d1.clone()).await;

        store.add_like(&d1).await.unwrap();
        store.increase_download(&d1).await.unwrap();
        store.remove_like(&d1).await.unwrap();
        store.remove_like(&d1).await.unwrap();

        let info = ReverselyRelatedResourceInfo {
            promoter: ResourceIndex::new("alice", "p1"),
            resource: d1.clone(),
        };
        store.add_related(ResourceType::Project, &info).await.unwrap();

        let counters = store.counters(&d1).await.unwrap();
        assert_eq!(counters.like_count, 0);
        assert_eq!(counters.download_count, 1);
        assert_eq!(counters.related.len(), 1);

        store.remove_related(ResourceType::Project, &info).await.unwrap();
        assert!(store.counters(&d1).await.unwrap().related.is_empty());
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let store = MemoryResourceStore::new(ResourceType::Model);
        let err = store
            .add_like(&ResourceIndex::new("bob", "gone"))
            .await
            .unwrap_err();
        assert!(err.is_resource_not_exists());
        assert_eq!(err.to_string(), "resource not exists: model bob/gone");
    }

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new(100);
        clock.advance(5);
        assert_eq!(clock.now(), 105);
        clock.set(7);
        assert_eq!(clock.now(), 7);
    }
}
