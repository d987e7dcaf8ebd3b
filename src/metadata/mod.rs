//! # Metadata Store Ports
//!
//! Capability interfaces for the remote per-project/per-sample metadata store
//! and the secondary project summary store. The delivery core only ever talks to
//! these traits; concrete HTTP clients and in-memory fakes live in submodules.
//!
//! Reads may be stale by the time a corresponding write happens. There is no
//! compare-and-swap: every write is last-writer-wins.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::SAMPLE_STATUS_ABORTED;
use crate::error::DeliveryResult;
use crate::state_machine::states::{DeliveryRecord, DeliveryState, DeliveryToken};

pub use http::{HttpMetadataStore, HttpSummaryStore};
pub use memory::{InMemoryMetadataStore, InMemorySummaryStore};

/// Project entry as read from the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(alias = "projectid")]
    pub project_id: String,
    #[serde(flatten)]
    pub delivery: DeliveryRecord,
}

impl ProjectRecord {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            delivery: DeliveryRecord::default(),
        }
    }

    pub fn delivery_state(&self) -> DeliveryState {
        self.delivery.derived_state()
    }
}

/// Sample entry as read from the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(alias = "projectid")]
    pub project_id: String,
    #[serde(alias = "sampleid")]
    pub sample_id: String,
    /// Processing status maintained upstream, independent of delivery
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub delivery: DeliveryRecord,
}

impl SampleRecord {
    pub fn new(project_id: impl Into<String>, sample_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            sample_id: sample_id.into(),
            status: None,
            delivery: DeliveryRecord::default(),
        }
    }

    pub fn with_state(mut self, state: DeliveryState) -> Self {
        self.delivery.delivery_status = Some(state);
        self
    }

    pub fn delivery_state(&self) -> DeliveryState {
        self.delivery.explicit_state()
    }

    /// Aborted either by processing status or by delivery status
    pub fn is_aborted(&self) -> bool {
        self.status.as_deref() == Some(SAMPLE_STATUS_ABORTED)
            || self.delivery_state() == DeliveryState::Aborted
    }
}

/// Partial update of the delivery fields of a record. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_token: Option<DeliveryToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_projects: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_started: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    pub fn status(state: DeliveryState) -> Self {
        Self {
            delivery_status: Some(state),
            ..Self::default()
        }
    }

    pub fn token(token: DeliveryToken) -> Self {
        Self {
            delivery_token: Some(token),
            ..Self::default()
        }
    }

    pub fn delivery_projects(projects: Vec<String>) -> Self {
        Self {
            delivery_projects: Some(projects),
            ..Self::default()
        }
    }

    pub fn with_started(mut self, started: DateTime<Utc>) -> Self {
        self.delivery_started = Some(started);
        self
    }

    /// Apply the update to a record in place
    pub fn apply(&self, record: &mut DeliveryRecord) {
        if let Some(status) = self.delivery_status {
            record.delivery_status = Some(status);
        }
        if let Some(token) = &self.delivery_token {
            record.delivery_token = token.clone();
        }
        if let Some(projects) = &self.delivery_projects {
            record.delivery_projects = projects.clone();
        }
        if let Some(started) = self.delivery_started {
            record.delivery_started = Some(started);
        }
    }
}

/// Per-project and per-sample delivery metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn project(&self, project_id: &str) -> DeliveryResult<ProjectRecord>;

    async fn project_samples(&self, project_id: &str) -> DeliveryResult<Vec<SampleRecord>>;

    async fn sample(&self, project_id: &str, sample_id: &str) -> DeliveryResult<SampleRecord>;

    async fn update_project(&self, project_id: &str, update: &RecordUpdate) -> DeliveryResult<()>;

    async fn update_sample(
        &self,
        project_id: &str,
        sample_id: &str,
        update: &RecordUpdate,
    ) -> DeliveryResult<()>;

    /// Identifiers of the samples whose explicit state matches, or all samples for `None`
    async fn samples_in_state(
        &self,
        project_id: &str,
        state: Option<DeliveryState>,
    ) -> DeliveryResult<Vec<String>> {
        let samples = self.project_samples(project_id).await?;
        Ok(samples
            .into_iter()
            .filter(|s| state.map_or(true, |wanted| s.delivery_state() == wanted))
            .map(|s| s.sample_id)
            .collect())
    }
}

/// Secondary project summary store
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Append a delivery-project identifier to the project's summary document
    async fn append_delivery_project(
        &self,
        project_id: &str,
        delivery_project: &str,
    ) -> DeliveryResult<()>;

    /// Order-portal identifier recorded for the project
    async fn order_portal_id(&self, project_id: &str) -> DeliveryResult<String>;
}
