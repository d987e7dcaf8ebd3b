//! # Delivery Monitor
//!
//! Reconciliation loop for a project under delivery. It polls the transfer
//! status of the project's live token until the transfer is delivered or the
//! configured ceiling is exceeded, then writes the outcome back to every
//! in-flight sample, releases the token and recomputes project completion.
//!
//! Eligibility is derived from the token alone, so a restarted monitor picks
//! up the same transfer where the previous one stopped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{MonitorConfig, PathContext, PathsConfig};
use crate::error::DeliveryResult;
use crate::gateway::{DeliveryGateway, TransferStatus};
use crate::logging::{log_delivery_operation, log_error, log_monitor_poll};
use crate::staging::StagingManager;
use crate::state_machine::{
    DeliveryBookkeeping, DeliveryState, DeliveryToken, SampleEvent, SampleStateMachine,
};

/// How a monitor run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// No live token; nothing was polled. Carries the derived project state.
    NotUnderDelivery(DeliveryState),
    /// The transfer reached a terminal outcome and the project was reconciled
    Completed {
        /// `DELIVERED` or `FAILED`
        outcome: DeliveryState,
        /// Derived project state after reconciliation
        project_state: DeliveryState,
    },
}

pub struct DeliveryMonitor {
    bookkeeping: DeliveryBookkeeping,
    gateway: Arc<dyn DeliveryGateway>,
    paths: PathsConfig,
    poll_interval: Duration,
    max_delivery: Duration,
}

impl DeliveryMonitor {
    pub fn new(
        bookkeeping: DeliveryBookkeeping,
        gateway: Arc<dyn DeliveryGateway>,
        paths: PathsConfig,
        poll_interval: Duration,
        max_delivery: Duration,
    ) -> Self {
        Self {
            bookkeeping,
            gateway,
            paths,
            poll_interval,
            max_delivery,
        }
    }

    pub fn from_config(
        bookkeeping: DeliveryBookkeeping,
        gateway: Arc<dyn DeliveryGateway>,
        paths: PathsConfig,
        monitor: &MonitorConfig,
    ) -> DeliveryResult<Self> {
        Ok(Self::new(
            bookkeeping,
            gateway,
            paths,
            monitor.poll_interval(),
            monitor.max_delivery_duration()?,
        ))
    }

    fn ceiling_hours(&self) -> u64 {
        self.max_delivery.as_secs() / 3600
    }

    /// Poll until the project's transfer ends, then reconcile samples and project
    pub async fn monitor_project(&self, project_id: &str) -> DeliveryResult<MonitorOutcome> {
        self.gateway.check_version().await?;

        let project = self.bookkeeping.metadata().project(project_id).await?;
        let state = project.delivery_state();
        let Some(token) = project.delivery.delivery_token.live().map(DeliveryToken::new) else {
            info!(
                project_id = %project_id,
                delivery_status = %state,
                "Project has no delivery token, it is not being delivered at the moment"
            );
            return Ok(MonitorOutcome::NotUnderDelivery(state));
        };

        let staging = StagingManager::for_project(&self.paths, &PathContext::for_project(project_id))?;
        // Without a persisted start the first poll stands in for it
        let started = project.delivery.delivery_started.unwrap_or_else(Utc::now);

        info!(
            project_id = %project_id,
            delivery_token = %token,
            delivery_started = %started.to_rfc3339(),
            "Project under delivery, starting monitoring"
        );

        let (outcome, reason) = self.poll_until_terminal(project_id, &token, &staging, started).await?;
        let project_state = self.reconcile(project_id, &staging, outcome, reason).await?;

        log_delivery_operation(
            "monitor_project",
            project_id,
            None,
            outcome.as_str(),
            Some(token.as_str()),
        );
        Ok(MonitorOutcome::Completed {
            outcome,
            project_state,
        })
    }

    async fn poll_until_terminal(
        &self,
        project_id: &str,
        token: &DeliveryToken,
        staging: &StagingManager,
        started: DateTime<Utc>,
    ) -> DeliveryResult<(DeliveryState, String)> {
        loop {
            let status = self.gateway.probe_status(token).await.map_err(|e| {
                log_error("delivery_monitor", "probe_status", &e.to_string(), Some(project_id));
                e
            })?;

            if status.is_terminal() {
                if staging.hard_root().exists() {
                    error!(
                        project_id = %project_id,
                        delivery_token = %token,
                        hard_stage = %staging.hard_root().display(),
                        "Transfer reported delivered but the hard stage is still present, failing delivery"
                    );
                    return Ok((
                        DeliveryState::Failed,
                        "delivered status contradicted by remaining hard stage".to_string(),
                    ));
                }
                info!(project_id = %project_id, delivery_token = %token, "Project successfully delivered");
                return Ok((DeliveryState::Delivered, String::new()));
            }

            let elapsed = Utc::now()
                .signed_duration_since(started)
                .to_std()
                .unwrap_or_default();
            log_monitor_poll(
                project_id,
                token.as_str(),
                &status.to_string(),
                elapsed.as_secs_f64() / 3600.0,
            );

            if elapsed > self.max_delivery {
                error!(
                    project_id = %project_id,
                    delivery_token = %token,
                    "Delivery has been ongoing for more than {} hours, the project status will be reset",
                    self.ceiling_hours()
                );
                return Ok((
                    DeliveryState::Failed,
                    format!("ongoing for more than {} hours", self.ceiling_hours()),
                ));
            }

            match &status {
                TransferStatus::Accepted | TransferStatus::InProgress => info!(
                    project_id = %project_id,
                    delivery_token = %token,
                    status = %status,
                    "Project under delivery"
                ),
                TransferStatus::Failed => warn!(
                    project_id = %project_id,
                    delivery_token = %token,
                    status = %status,
                    "Project under delivery, transfer tool reports a failure"
                ),
                TransferStatus::Unknown(raw) => warn!(
                    project_id = %project_id,
                    delivery_token = %token,
                    status = %raw,
                    "Project under delivery, unexpected status from transfer tool"
                ),
                TransferStatus::Delivered => {}
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Returns the derived project state after reconciliation
    async fn reconcile(
        &self,
        project_id: &str,
        staging: &StagingManager,
        outcome: DeliveryState,
        reason: String,
    ) -> DeliveryResult<DeliveryState> {
        let metadata = self.bookkeeping.metadata();
        let machine = SampleStateMachine::new(self.bookkeeping.clone(), staging.clone());

        let event = match outcome {
            DeliveryState::Delivered => SampleEvent::Deliver,
            _ => SampleEvent::Fail(reason),
        };

        let in_progress = metadata
            .samples_in_state(project_id, Some(DeliveryState::InProgress))
            .await?;
        for sample_id in &in_progress {
            if let Err(e) = machine
                .transition(project_id, sample_id, event.clone())
                .await
            {
                log_error(
                    "delivery_monitor",
                    "update_sample_outcome",
                    &e.to_string(),
                    Some(sample_id.as_str()),
                );
            }
        }

        self.bookkeeping.clear_project_token(project_id).await?;

        // A failed transfer or a project without samples is never completed here
        let samples = metadata.project_samples(project_id).await?;
        let complete = outcome == DeliveryState::Delivered
            && !samples.is_empty()
            && samples
                .iter()
                .all(|s| s.is_aborted() || s.delivery_state().counts_as_complete());
        if complete {
            self.bookkeeping
                .set_project_status(project_id, DeliveryState::Delivered)
                .await?;
        } else {
            info!(
                project_id = %project_id,
                outcome = %outcome,
                samples = samples.len(),
                "Not every sample is delivered or aborted, project is left undelivered"
            );
        }

        Ok(metadata.project(project_id).await?.delivery_state())
    }
}
