//! In-memory metadata and summary stores.
//!
//! Used by the test suite and by dry runs. Writes to selected samples can be
//! made to fail so best-effort bookkeeping paths can be exercised.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{MetadataStore, ProjectRecord, RecordUpdate, SampleRecord, SummaryStore};
use crate::error::{DeliveryError, DeliveryResult};

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    projects: RwLock<HashMap<String, ProjectRecord>>,
    samples: RwLock<BTreeMap<(String, String), SampleRecord>>,
    failing_sample_writes: RwLock<HashSet<String>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: ProjectRecord) {
        self.projects
            .write()
            .insert(project.project_id.clone(), project);
    }

    pub fn insert_sample(&self, sample: SampleRecord) {
        self.samples.write().insert(
            (sample.project_id.clone(), sample.sample_id.clone()),
            sample,
        );
    }

    /// Make every subsequent write to this sample fail with a database error
    pub fn fail_writes_for_sample(&self, sample_id: impl Into<String>) {
        self.failing_sample_writes.write().insert(sample_id.into());
    }

    pub fn project_snapshot(&self, project_id: &str) -> Option<ProjectRecord> {
        self.projects.read().get(project_id).cloned()
    }

    pub fn sample_snapshot(&self, project_id: &str, sample_id: &str) -> Option<SampleRecord> {
        self.samples
            .read()
            .get(&(project_id.to_string(), sample_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn project(&self, project_id: &str) -> DeliveryResult<ProjectRecord> {
        self.project_snapshot(project_id).ok_or_else(|| {
            DeliveryError::DatabaseError(format!("Project {project_id} not found"))
        })
    }

    async fn project_samples(&self, project_id: &str) -> DeliveryResult<Vec<SampleRecord>> {
        if !self.projects.read().contains_key(project_id) {
            return Err(DeliveryError::DatabaseError(format!(
                "No sample listing for unknown project {project_id}"
            )));
        }
        Ok(self
            .samples
            .read()
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn sample(&self, project_id: &str, sample_id: &str) -> DeliveryResult<SampleRecord> {
        self.sample_snapshot(project_id, sample_id).ok_or_else(|| {
            DeliveryError::DatabaseError(format!(
                "Sample {sample_id} of project {project_id} not found"
            ))
        })
    }

    async fn update_project(&self, project_id: &str, update: &RecordUpdate) -> DeliveryResult<()> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(project_id).ok_or_else(|| {
            DeliveryError::DatabaseError(format!("Project {project_id} not found"))
        })?;
        update.apply(&mut project.delivery);
        Ok(())
    }

    async fn update_sample(
        &self,
        project_id: &str,
        sample_id: &str,
        update: &RecordUpdate,
    ) -> DeliveryResult<()> {
        if self.failing_sample_writes.read().contains(sample_id) {
            return Err(DeliveryError::DatabaseError(format!(
                "Write rejected for sample {sample_id}"
            )));
        }
        let mut samples = self.samples.write();
        let sample = samples
            .get_mut(&(project_id.to_string(), sample_id.to_string()))
            .ok_or_else(|| {
                DeliveryError::DatabaseError(format!(
                    "Sample {sample_id} of project {project_id} not found"
                ))
            })?;
        update.apply(&mut sample.delivery);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    delivery_projects: RwLock<HashMap<String, Vec<String>>>,
    portal_ids: RwLock<HashMap<String, String>>,
    fail_writes: RwLock<bool>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_portal_id(&self, project_id: impl Into<String>, portal_id: impl Into<String>) {
        self.portal_ids
            .write()
            .insert(project_id.into(), portal_id.into());
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.write() = true;
    }

    pub fn delivery_projects(&self, project_id: &str) -> Vec<String> {
        self.delivery_projects
            .read()
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn append_delivery_project(
        &self,
        project_id: &str,
        delivery_project: &str,
    ) -> DeliveryResult<()> {
        if *self.fail_writes.read() {
            return Err(DeliveryError::DatabaseError(format!(
                "Summary document for {project_id} could not be saved"
            )));
        }
        self.delivery_projects
            .write()
            .entry(project_id.to_string())
            .or_default()
            .push(delivery_project.to_string());
        Ok(())
    }

    async fn order_portal_id(&self, project_id: &str) -> DeliveryResult<String> {
        self.portal_ids
            .read()
            .get(project_id)
            .cloned()
            .ok_or_else(|| {
                DeliveryError::DatabaseError(format!(
                    "Project {project_id} has no order portal entry"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::states::DeliveryState;

    #[tokio::test]
    async fn test_samples_in_state_filters_by_explicit_state() {
        let store = InMemoryMetadataStore::new();
        store.insert_project(ProjectRecord::new("P1"));
        store.insert_sample(SampleRecord::new("P1", "S1").with_state(DeliveryState::Staged));
        store.insert_sample(SampleRecord::new("P1", "S2").with_state(DeliveryState::Delivered));
        store.insert_sample(SampleRecord::new("P2", "S3").with_state(DeliveryState::Staged));

        let staged = store
            .samples_in_state("P1", Some(DeliveryState::Staged))
            .await
            .unwrap();
        assert_eq!(staged, vec!["S1".to_string()]);

        let all = store.samples_in_state("P1", None).await.unwrap();
        assert_eq!(all, vec!["S1".to_string(), "S2".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_sample_writes() {
        let store = InMemoryMetadataStore::new();
        store.insert_project(ProjectRecord::new("P1"));
        store.insert_sample(SampleRecord::new("P1", "S1"));
        store.fail_writes_for_sample("S1");

        let result = store
            .update_sample("P1", "S1", &RecordUpdate::status(DeliveryState::Staged))
            .await;
        assert!(matches!(result, Err(DeliveryError::DatabaseError(_))));
    }
}
