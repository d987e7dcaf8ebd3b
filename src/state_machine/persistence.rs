//! Delivery bookkeeping on top of the metadata ports.
//!
//! Writes that decide whether a delivery is claimed or finished propagate
//! their errors. Enrichment writes (delivery-project lists, summary store,
//! per-sample tokens) are best-effort: failures are logged and swallowed, so
//! the remote list and the local records can drift apart.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::states::{DeliveryState, DeliveryToken};
use crate::error::{DeliveryError, DeliveryResult};
use crate::logging::log_error;
use crate::metadata::{MetadataStore, RecordUpdate, SummaryStore};

#[derive(Clone)]
pub struct DeliveryBookkeeping {
    metadata: Arc<dyn MetadataStore>,
    summary: Option<Arc<dyn SummaryStore>>,
    record_metadata: bool,
}

impl DeliveryBookkeeping {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            metadata,
            summary: None,
            record_metadata: false,
        }
    }

    /// Enable summary-store writes; they only happen when `record_metadata` is set
    pub fn with_summary_store(mut self, summary: Arc<dyn SummaryStore>, record_metadata: bool) -> Self {
        self.summary = Some(summary);
        self.record_metadata = record_metadata;
        self
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Unconditional last-writer-wins status write
    pub async fn set_sample_status(
        &self,
        project_id: &str,
        sample_id: &str,
        state: DeliveryState,
    ) -> DeliveryResult<()> {
        self.metadata
            .update_sample(project_id, sample_id, &RecordUpdate::status(state))
            .await?;
        info!(
            project_id = %project_id,
            sample_id = %sample_id,
            delivery_status = %state,
            "Sample delivery status updated"
        );
        Ok(())
    }

    pub async fn set_project_status(
        &self,
        project_id: &str,
        state: DeliveryState,
    ) -> DeliveryResult<()> {
        self.metadata
            .update_project(project_id, &RecordUpdate::status(state))
            .await?;
        info!(
            project_id = %project_id,
            delivery_status = %state,
            "Project delivery status updated"
        );
        Ok(())
    }

    /// Record the live token on the project together with the start time
    pub async fn save_project_token(
        &self,
        project_id: &str,
        token: &DeliveryToken,
        started: DateTime<Utc>,
    ) -> DeliveryResult<()> {
        let update = RecordUpdate::token(token.clone()).with_started(started);
        self.metadata.update_project(project_id, &update).await?;
        info!(
            project_id = %project_id,
            delivery_token = %token,
            delivery_started = %started.to_rfc3339(),
            "Project delivery token saved"
        );
        Ok(())
    }

    /// Release the project token back to the sentinel
    pub async fn clear_project_token(&self, project_id: &str) -> DeliveryResult<()> {
        self.metadata
            .update_project(project_id, &RecordUpdate::token(DeliveryToken::none()))
            .await?;
        info!(project_id = %project_id, "Project delivery token cleared");
        Ok(())
    }

    /// Best-effort: append the delivery project to the project record unless present
    pub async fn append_project_delivery_project(&self, project_id: &str, delivery_project: &str) {
        let result = async {
            let project = self.metadata.project(project_id).await?;
            if project.delivery.has_delivery_project(delivery_project) {
                warn!(
                    project_id = %project_id,
                    delivery_project = %delivery_project,
                    "Delivery project already recorded on project, not adding it again"
                );
                return Ok(());
            }
            let mut projects = project.delivery.delivery_projects;
            projects.push(delivery_project.to_string());
            self.metadata
                .update_project(project_id, &RecordUpdate::delivery_projects(projects))
                .await?;
            info!(
                project_id = %project_id,
                delivery_project = %delivery_project,
                "Project delivery_projects updated"
            );
            Ok::<(), DeliveryError>(())
        }
        .await;

        if let Err(e) = result {
            log_error(
                "bookkeeping",
                "append_project_delivery_project",
                &e.to_string(),
                Some(project_id),
            );
        }
    }

    /// Best-effort: record the delivery project in the summary store when enabled
    pub async fn record_summary_delivery_project(&self, project_id: &str, delivery_project: &str) {
        if !self.record_metadata {
            return;
        }
        let Some(summary) = &self.summary else {
            return;
        };
        if let Err(e) = summary
            .append_delivery_project(project_id, delivery_project)
            .await
        {
            log_error(
                "bookkeeping",
                "record_summary_delivery_project",
                &e.to_string(),
                Some(project_id),
            );
        }
    }

    /// Best-effort: mirror the project token and delivery project onto one sample
    pub async fn save_sample_delivery(
        &self,
        project_id: &str,
        sample_id: &str,
        token: &DeliveryToken,
        delivery_project: Option<&str>,
    ) {
        let result = async {
            self.metadata
                .update_sample(project_id, sample_id, &RecordUpdate::token(token.clone()))
                .await?;

            let Some(delivery_project) = delivery_project else {
                return Ok(());
            };
            let sample = self.metadata.sample(project_id, sample_id).await?;
            if sample.delivery.has_delivery_project(delivery_project) {
                warn!(
                    project_id = %project_id,
                    sample_id = %sample_id,
                    delivery_project = %delivery_project,
                    "Delivery project already recorded on sample, not adding it again"
                );
                return Ok(());
            }
            let mut projects = sample.delivery.delivery_projects;
            projects.push(delivery_project.to_string());
            self.metadata
                .update_sample(
                    project_id,
                    sample_id,
                    &RecordUpdate::delivery_projects(projects),
                )
                .await?;
            Ok::<(), DeliveryError>(())
        }
        .await;

        match result {
            Ok(()) => info!(
                project_id = %project_id,
                sample_id = %sample_id,
                delivery_token = %token,
                "Sample delivery bookkeeping saved"
            ),
            Err(e) => log_error(
                "bookkeeping",
                "save_sample_delivery",
                &e.to_string(),
                Some(sample_id),
            ),
        }
    }
}
