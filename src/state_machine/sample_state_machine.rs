use tracing::{error, info, warn};

use super::{
    events::SampleEvent,
    guards::{GuardError, SampleStagedGuard, StateGuard},
    persistence::DeliveryBookkeeping,
    states::DeliveryState,
};
use crate::error::{DeliveryError, DeliveryResult};
use crate::logging::log_delivery_operation;
use crate::staging::StagingManager;

/// Result of asking the machine to hard stage one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDeliveryOutcome {
    /// Copied into the hard stage, now `IN_PROGRESS`
    HardStaged,
    /// Skipped without side effects; carries the state that made it ineligible
    NotEligible(DeliveryState),
}

/// Per-sample delivery lifecycle for the samples of one project
#[derive(Clone)]
pub struct SampleStateMachine {
    bookkeeping: DeliveryBookkeeping,
    staging: StagingManager,
}

impl SampleStateMachine {
    pub fn new(bookkeeping: DeliveryBookkeeping, staging: StagingManager) -> Self {
        Self {
            bookkeeping,
            staging,
        }
    }

    /// Current explicit state of the sample
    pub async fn current_state(&self, project_id: &str, sample_id: &str) -> DeliveryResult<DeliveryState> {
        let sample = self.bookkeeping.metadata().sample(project_id, sample_id).await?;
        Ok(sample.delivery_state())
    }

    /// Transition table of the sample lifecycle
    pub fn determine_target_state(
        current_state: DeliveryState,
        event: &SampleEvent,
    ) -> DeliveryResult<DeliveryState> {
        let target = match (current_state, event) {
            (DeliveryState::Staged, SampleEvent::StartHardStage) => DeliveryState::InProgress,

            // Rollback after a failed copy
            (DeliveryState::InProgress, SampleEvent::HardStageFailed(_)) => DeliveryState::Staged,

            (DeliveryState::InProgress, SampleEvent::Deliver) => DeliveryState::Delivered,
            (DeliveryState::InProgress, SampleEvent::Fail(_)) => DeliveryState::Failed,

            (from_state, _) => {
                return Err(DeliveryError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Read the current state, validate the event against it and persist the target
    pub async fn transition(
        &self,
        project_id: &str,
        sample_id: &str,
        event: SampleEvent,
    ) -> DeliveryResult<DeliveryState> {
        let current_state = self.current_state(project_id, sample_id).await?;
        let target_state = Self::determine_target_state(current_state, &event)?;
        if let Some(reason) = event.error_message() {
            warn!(
                project_id = %project_id,
                sample_id = %sample_id,
                event = event.event_type(),
                reason = %reason,
                "Sample moves to {target_state}"
            );
        }
        self.update_delivery_status(project_id, sample_id, target_state)
            .await?;
        Ok(target_state)
    }

    /// Hard stage one sample.
    ///
    /// Only a `STAGED` sample is eligible; anything else returns
    /// [`SampleDeliveryOutcome::NotEligible`] and touches nothing. A failed copy
    /// rolls the sample back to `STAGED` and returns the copy error.
    pub async fn deliver_sample(
        &self,
        project_id: &str,
        sample_id: &str,
    ) -> DeliveryResult<SampleDeliveryOutcome> {
        let sample = self
            .bookkeeping
            .metadata()
            .sample(project_id, sample_id)
            .await
            .map_err(|e| {
                error!(
                    project_id = %project_id,
                    sample_id = %sample_id,
                    error = %e,
                    "Cannot read sample for delivery"
                );
                e
            })?;

        match SampleStagedGuard.check(&sample) {
            Ok(()) => {}
            Err(GuardError::NotEligible(reason)) => {
                info!(
                    project_id = %project_id,
                    sample_id = %sample_id,
                    reason = %reason,
                    "Sample has not been staged and will not be delivered"
                );
                return Ok(SampleDeliveryOutcome::NotEligible(sample.delivery_state()));
            }
            Err(other) => return Err(other.into()),
        }

        let claimed = self
            .transition(project_id, sample_id, SampleEvent::StartHardStage)
            .await?;

        if let Err(copy_error) = self.staging.hard_stage_sample(sample_id) {
            error!(
                project_id = %project_id,
                sample_id = %sample_id,
                error = %copy_error,
                "Hard staging failed, rolling sample back"
            );
            let rollback = SampleEvent::HardStageFailed(copy_error.to_string());
            if let Err(e) = self.transition(project_id, sample_id, rollback).await {
                error!(
                    project_id = %project_id,
                    sample_id = %sample_id,
                    error = %e,
                    "Rollback of sample status failed, sample is left {claimed}"
                );
            }
            return Err(copy_error);
        }

        log_delivery_operation(
            "hard_stage_sample",
            project_id,
            Some(sample_id),
            claimed.as_str(),
            None,
        );
        Ok(SampleDeliveryOutcome::HardStaged)
    }

    /// Unconditional status write, last writer wins
    pub async fn update_delivery_status(
        &self,
        project_id: &str,
        sample_id: &str,
        state: DeliveryState,
    ) -> DeliveryResult<()> {
        self.bookkeeping
            .set_sample_status(project_id, sample_id, state)
            .await
    }
}
