//! On-disk soft stage plus in-memory stores for one project.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use delivery_core::config::PathsConfig;
use delivery_core::metadata::{
    InMemoryMetadataStore, InMemorySummaryStore, MetadataStore, ProjectRecord, SampleRecord,
    SummaryStore,
};
use delivery_core::orchestration::DeliveryOptions;
use delivery_core::state_machine::{DeliveryBookkeeping, DeliveryState, DeliveryToken};

pub struct ProjectFixture {
    pub project_id: String,
    pub root: TempDir,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub summary: Arc<InMemorySummaryStore>,
}

impl ProjectFixture {
    pub fn new(project_id: &str) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let fixture = Self {
            project_id: project_id.to_string(),
            root,
            metadata: Arc::new(InMemoryMetadataStore::new()),
            summary: Arc::new(InMemorySummaryStore::new()),
        };
        fs::create_dir_all(fixture.soft_root()).expect("soft stage");
        fs::create_dir_all(fixture.root.path().join("hard")).expect("hard stage parent");
        fixture
            .metadata
            .insert_project(ProjectRecord::new(project_id));
        fixture
    }

    pub fn paths(&self) -> PathsConfig {
        let root = self.root.path().display();
        PathsConfig {
            soft_stage: format!("{root}/soft/_PROJECTID_"),
            hard_stage: format!("{root}/hard/_PROJECTID_"),
            run_folder_data: Some(format!("{root}/archives")),
        }
    }

    pub fn soft_root(&self) -> PathBuf {
        self.root.path().join("soft").join(&self.project_id)
    }

    pub fn hard_root(&self) -> PathBuf {
        self.root.path().join("hard").join(&self.project_id)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.path().join("archives")
    }

    /// Sample record in the given state plus a payload directory with one file
    pub fn add_sample(&self, sample_id: &str, state: DeliveryState) -> &Self {
        let dir = self.soft_root().join(sample_id).join("01-RAW");
        fs::create_dir_all(&dir).expect("sample dir");
        fs::write(dir.join(format!("{sample_id}_R1.fastq.gz")), sample_id).expect("payload");
        self.metadata
            .insert_sample(SampleRecord::new(&self.project_id, sample_id).with_state(state));
        self
    }

    /// Sample record without anything on disk
    pub fn add_sample_record(&self, sample_id: &str, state: DeliveryState) -> &Self {
        self.metadata
            .insert_sample(SampleRecord::new(&self.project_id, sample_id).with_state(state));
        self
    }

    pub fn add_aborted_sample(&self, sample_id: &str) -> &Self {
        let mut sample = SampleRecord::new(&self.project_id, sample_id);
        sample.status = Some("ABORTED".to_string());
        self.metadata.insert_sample(sample);
        self
    }

    pub fn add_misc_file(&self, name: &str) -> &Self {
        fs::write(self.soft_root().join(name), name).expect("misc file");
        self
    }

    /// Symlink in the soft stage whose target does not exist
    #[cfg(unix)]
    pub fn add_dangling_link(&self, name: &str) -> &Self {
        std::os::unix::fs::symlink(
            self.root.path().join("nowhere").join(name),
            self.soft_root().join(name),
        )
        .expect("symlink");
        self
    }

    /// Put the project under delivery with the given token and start time
    pub fn set_project_delivery(&self, token: &str, started: Option<DateTime<Utc>>) -> &Self {
        let mut project = self
            .metadata
            .project_snapshot(&self.project_id)
            .expect("project");
        project.delivery.delivery_token = DeliveryToken::new(token);
        project.delivery.delivery_started = started;
        self.metadata.insert_project(project);
        self
    }

    pub fn set_project_status(&self, state: DeliveryState) -> &Self {
        let mut project = self
            .metadata
            .project_snapshot(&self.project_id)
            .expect("project");
        project.delivery.delivery_status = Some(state);
        self.metadata.insert_project(project);
        self
    }

    pub fn add_project_delivery_project(&self, delivery_project: &str) -> &Self {
        let mut project = self
            .metadata
            .project_snapshot(&self.project_id)
            .expect("project");
        project
            .delivery
            .delivery_projects
            .push(delivery_project.to_string());
        self.metadata.insert_project(project);
        self
    }

    pub fn bookkeeping(&self) -> DeliveryBookkeeping {
        let metadata: Arc<dyn MetadataStore> = self.metadata.clone();
        let summary: Arc<dyn SummaryStore> = self.summary.clone();
        DeliveryBookkeeping::new(metadata).with_summary_store(summary, true)
    }

    /// Options that can run without privileges: the group is the caller's own
    pub fn options(&self) -> DeliveryOptions {
        DeliveryOptions {
            delivery_group_id: own_gid(self.root.path()),
            ..DeliveryOptions::default()
        }
    }

    pub fn project(&self) -> ProjectRecord {
        self.metadata
            .project_snapshot(&self.project_id)
            .expect("project")
    }

    pub fn sample(&self, sample_id: &str) -> SampleRecord {
        self.metadata
            .sample_snapshot(&self.project_id, sample_id)
            .expect("sample")
    }

    pub fn sample_state(&self, sample_id: &str) -> DeliveryState {
        self.sample(sample_id).delivery_state()
    }
}

#[cfg(unix)]
fn own_gid(path: &Path) -> u32 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).expect("metadata").gid()
}

#[cfg(not(unix))]
fn own_gid(_path: &Path) -> u32 {
    0
}
