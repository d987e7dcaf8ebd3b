//! # Project Delivery
//!
//! Drives one operator-initiated delivery of a project: guards, confirmations,
//! hard staging of every staged sample and of the miscellaneous soft-stage
//! entries, the remote ticket, the transfer, and the bookkeeping of the
//! resulting token.
//!
//! Local problems abort loudly before anything remote happens. Remote
//! enrichment (ticket, delivery-project lists) degrades to log lines.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::contacts::DeliveryContacts;
use crate::config::{PathContext, PathsConfig};
use crate::confirmation::ConfirmationPort;
use crate::constants::transfer::DELIVERY_GROUP_ID;
use crate::constants::ticket::VALIDITY_DAYS;
use crate::error::{DeliveryError, DeliveryResult};
use crate::gateway::{DateWindow, DeliveryGateway, DeliveryTicketRequest};
use crate::logging::{log_delivery_operation, log_error};
use crate::staging::{DeliveryLock, StagingManager};
use crate::state_machine::guards::{project_delivery_decision, ProjectDeliveryDecision};
use crate::state_machine::{
    DeliveryBookkeeping, DeliveryState, DeliveryToken, SampleDeliveryOutcome, SampleStateMachine,
};

/// Per-invocation switches
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Deliver again even when the project reads `DELIVERED`
    pub force: bool,
    /// Sensitivity flag recorded on the ticket; the operator confirms it
    pub sensitive: bool,
    pub delivery_group_id: u32,
    pub ticket_validity_days: i64,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            force: false,
            sensitive: true,
            delivery_group_id: DELIVERY_GROUP_ID,
            ticket_validity_days: VALIDITY_DAYS,
        }
    }
}

pub struct ProjectDeliverer {
    bookkeeping: DeliveryBookkeeping,
    gateway: Arc<dyn DeliveryGateway>,
    confirmation: Arc<dyn ConfirmationPort>,
    paths: PathsConfig,
    options: DeliveryOptions,
    contacts: DeliveryContacts,
}

impl ProjectDeliverer {
    pub fn new(
        bookkeeping: DeliveryBookkeeping,
        gateway: Arc<dyn DeliveryGateway>,
        confirmation: Arc<dyn ConfirmationPort>,
        paths: PathsConfig,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            bookkeeping,
            gateway,
            confirmation,
            paths,
            options,
            contacts: DeliveryContacts::default(),
        }
    }

    pub fn with_contacts(mut self, contacts: DeliveryContacts) -> Self {
        self.contacts = contacts;
        self
    }

    fn staging_for(&self, context: &PathContext) -> DeliveryResult<StagingManager> {
        StagingManager::for_project(&self.paths, context)
    }

    fn sensitivity_question(&self) -> &'static str {
        if self.options.sensitive {
            "This project has been marked as SENSITIVE (option --sensitive). Do you want to proceed with delivery? "
        } else {
            "This project has been marked as NON-SENSITIVE (option --no-sensitive). Do you want to proceed with delivery? "
        }
    }

    /// Deliver every staged sample of a project.
    ///
    /// Returns `Ok(true)` when a transfer was started or the project was
    /// already delivered, `Ok(false)` when the operator declined or no token
    /// came back.
    pub async fn deliver_project(&self, project_id: &str) -> DeliveryResult<bool> {
        self.gateway.check_version().await?;

        let staging = self.staging_for(&PathContext::for_project(project_id))?;
        let lock = staging.lock();
        if lock.is_held() {
            error!(
                project_id = %project_id,
                hard_stage = %lock.describe(),
                "Hard stage already present, multiple deliveries are not allowed"
            );
            return Err(DeliveryError::PreconditionViolation(format!(
                "Hard stage {} already present for project {project_id}",
                lock.describe()
            )));
        }

        let project = self.bookkeeping.metadata().project(project_id).await?;
        let state = project.delivery_state();
        match project_delivery_decision(project_id, state, self.options.force) {
            Ok(ProjectDeliveryDecision::AlreadyDelivered) => {
                info!(
                    project_id = %project_id,
                    "Project has already been delivered and will not be delivered again"
                );
                return Ok(true);
            }
            Ok(ProjectDeliveryDecision::ConfirmPartial) => {
                warn!(project_id = %project_id, "Project has already been partially delivered");
                if !self
                    .confirmation
                    .confirm("Do you want to proceed (yes/no): ")?
                {
                    error!(project_id = %project_id, "Partially delivered project, operator declined to proceed");
                    return Ok(false);
                }
                info!(project_id = %project_id, "Partially delivered project, operator confirmed to proceed");
            }
            Ok(ProjectDeliveryDecision::Proceed) => {}
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Project is already under delivery");
                return Err(e.into());
            }
        }

        if !self.confirmation.confirm(self.sensitivity_question())? {
            error!(
                project_id = %project_id,
                sensitive = self.options.sensitive,
                "Delivery aborted, sensitivity level was wrong"
            );
            return Ok(false);
        }

        let samples = self
            .bookkeeping
            .metadata()
            .samples_in_state(project_id, Some(DeliveryState::Staged))
            .await
            .map_err(|e| {
                log_error("project_deliverer", "staged_samples", &e.to_string(), Some(project_id));
                e
            })?;
        if samples.is_empty() {
            warn!(project_id = %project_id, "No staged samples found");
            return Err(DeliveryError::PreconditionViolation(format!(
                "No staged samples found for project {project_id}"
            )));
        }

        let misc = staging.misc_entries(&samples)?;

        let question = format!(
            "\nProject stagepath: {}\nSamples: {}\nMiscellaneous: {}\n\nProceed with delivery ? ",
            staging.soft_root().display(),
            samples.join(", "),
            misc.join(", ")
        );
        if !self.confirmation.confirm(&question)? {
            error!(project_id = %project_id, "Delivery aborted, remove unwanted files and try again");
            return Ok(false);
        }
        info!(project_id = %project_id, samples = samples.len(), misc = misc.len(), "Proceeding with delivery");

        lock.acquire()?;

        let hard_staged = self.hard_stage_samples(project_id, &staging, &samples).await?;
        self.hard_stage_misc(project_id, &staging, &misc)?;

        staging.assign_group(self.options.delivery_group_id)?;

        let ticket_id = self.create_ticket(project_id).await;
        let token = self.start_transfer(project_id, &staging, ticket_id.as_deref()).await?;

        if token.live().is_none() {
            error!(
                project_id = %project_id,
                hard_stage = %staging.hard_root().display(),
                "No delivery token returned, hard-staged data is left in place"
            );
            return Ok(false);
        }

        self.record_delivery(project_id, &token, ticket_id.as_deref(), &hard_staged)
            .await?;
        log_delivery_operation(
            "deliver_project",
            project_id,
            None,
            DeliveryState::InProgress.as_str(),
            Some(token.as_str()),
        );
        Ok(true)
    }

    async fn hard_stage_samples(
        &self,
        project_id: &str,
        staging: &StagingManager,
        samples: &[String],
    ) -> DeliveryResult<Vec<String>> {
        let machine = SampleStateMachine::new(self.bookkeeping.clone(), staging.clone());

        let mut hard_staged = Vec::with_capacity(samples.len());
        for sample_id in samples {
            match machine.deliver_sample(project_id, sample_id).await {
                Ok(SampleDeliveryOutcome::HardStaged) => hard_staged.push(sample_id.clone()),
                Ok(SampleDeliveryOutcome::NotEligible(state)) => warn!(
                    project_id = %project_id,
                    sample_id = %sample_id,
                    delivery_status = %state,
                    "Sample changed state since the eligibility query, skipped"
                ),
                Err(e) => {
                    log_error("project_deliverer", "hard_stage_sample", &e.to_string(), Some(sample_id.as_str()));
                    return Err(e);
                }
            }
        }

        if hard_staged.len() != samples.len() {
            warn!(project_id = %project_id, "Not all the samples have been hard staged, terminating");
            return Err(DeliveryError::PreconditionViolation(format!(
                "Staged samples {} != hard staged samples {}",
                samples.len(),
                hard_staged.len()
            )));
        }
        Ok(hard_staged)
    }

    fn hard_stage_misc(
        &self,
        project_id: &str,
        staging: &StagingManager,
        misc: &[String],
    ) -> DeliveryResult<()> {
        let mut copied = 0;
        for entry in misc {
            match staging.copy_misc_entry(entry) {
                Ok(()) => copied += 1,
                Err(e) => log_error("project_deliverer", "copy_misc_entry", &e.to_string(), Some(entry.as_str())),
            }
        }

        if copied != misc.len() {
            warn!(
                project_id = %project_id,
                "Not all the miscellaneous entries have been hard staged, terminating"
            );
            return Err(DeliveryError::PreconditionViolation(format!(
                "Miscellaneous entries {} != hard staged entries {copied}",
                misc.len()
            )));
        }
        Ok(())
    }

    /// Failure leaves the project hard staged without a ticket
    async fn create_ticket(&self, project_id: &str) -> Option<String> {
        let request = DeliveryTicketRequest {
            project_id: project_id.to_string(),
            pi_identity: self.contacts.pi_identity.clone(),
            sensitive: self.options.sensitive,
            member_identities: self.contacts.member_identities.clone(),
            window: DateWindow::starting_today(self.options.ticket_validity_days),
        };
        match self.gateway.create_delivery_ticket(&request).await {
            Ok(record) => {
                info!(
                    project_id = %project_id,
                    delivery_project = %record.ticket_id,
                    "Delivery project created"
                );
                Some(record.ticket_id)
            }
            Err(e) => {
                log_error("project_deliverer", "create_delivery_ticket", &e.to_string(), Some(project_id));
                None
            }
        }
    }

    async fn start_transfer(
        &self,
        project_id: &str,
        staging: &StagingManager,
        ticket_id: Option<&str>,
    ) -> DeliveryResult<DeliveryToken> {
        self.gateway
            .start_transfer(staging.hard_root(), ticket_id.unwrap_or_default())
            .await
            .map_err(|e| {
                log_error("project_deliverer", "start_transfer", &e.to_string(), Some(project_id));
                e
            })
    }

    async fn record_delivery(
        &self,
        project_id: &str,
        token: &DeliveryToken,
        delivery_project: Option<&str>,
        samples: &[String],
    ) -> DeliveryResult<()> {
        self.bookkeeping
            .save_project_token(project_id, token, Utc::now())
            .await?;

        match delivery_project {
            Some(delivery_project) => {
                self.bookkeeping
                    .append_project_delivery_project(project_id, delivery_project)
                    .await;
                self.bookkeeping
                    .record_summary_delivery_project(project_id, delivery_project)
                    .await;
            }
            None => warn!(
                project_id = %project_id,
                delivery_token = %token,
                "No delivery project to record, fix the ticket manually"
            ),
        }

        info!(
            project_id = %project_id,
            delivery_project = delivery_project.unwrap_or_default(),
            delivery_token = %token,
            "Delivery started"
        );

        for sample_id in samples {
            self.bookkeeping
                .save_sample_delivery(project_id, sample_id, token, delivery_project)
                .await;
        }
        Ok(())
    }

    /// Hard stage individual samples without starting a transfer
    pub async fn deliver_samples(
        &self,
        project_id: &str,
        sample_ids: &[String],
    ) -> DeliveryResult<Vec<(String, SampleDeliveryOutcome)>> {
        let staging = self.staging_for(&PathContext::for_project(project_id))?;
        let machine = SampleStateMachine::new(self.bookkeeping.clone(), staging);

        let mut outcomes = Vec::with_capacity(sample_ids.len());
        for sample_id in sample_ids {
            let outcome = machine.deliver_sample(project_id, sample_id).await?;
            outcomes.push((sample_id.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Deliver a pre-archived run folder: `<fcid>.tar` and its checksum
    pub async fn deliver_run_folder(&self, project_id: &str, fcid: &str) -> DeliveryResult<bool> {
        self.gateway.check_version().await?;

        let context = PathContext::for_project(project_id).with("fcid", fcid);
        let staging = self.staging_for(&context)?;
        let data_template = self.paths.run_folder_data.as_deref().ok_or_else(|| {
            DeliveryError::ConfigurationError(
                "[paths] run_folder_data is required for run-folder delivery".to_string(),
            )
        })?;
        let data_dir = context.expand(data_template)?;

        if !self.confirmation.confirm(self.sensitivity_question())? {
            error!(
                project_id = %project_id,
                sensitive = self.options.sensitive,
                "Delivery aborted, sensitivity level was wrong"
            );
            return Ok(false);
        }

        staging.lock().acquire()?;
        staging.stage_run_folder_archive(&data_dir, fcid)?;
        staging.assign_group(self.options.delivery_group_id)?;

        let ticket_id = self.create_ticket(project_id).await;
        let token = self.start_transfer(project_id, &staging, ticket_id.as_deref()).await?;

        match token.live() {
            Some(token) => {
                info!(
                    project_id = %project_id,
                    fcid = %fcid,
                    delivery_project = ticket_id.as_deref().unwrap_or_default(),
                    delivery_token = %token,
                    "Run-folder delivery started"
                );
                Ok(true)
            }
            None => {
                error!(project_id = %project_id, fcid = %fcid, "No delivery token returned for run folder");
                Ok(false)
            }
        }
    }
}
