use std::path::Path;
use thiserror::Error;

use super::states::DeliveryState;
use crate::error::DeliveryError;
use crate::metadata::SampleRecord;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardError {
    /// A hard stage exists already; another attempt claimed it
    #[error("Hard stage already present at {0}")]
    HardStageExists(String),

    /// A live token is recorded for the project
    #[error("Already under delivery: {0}")]
    DeliveryInProgress(String),

    /// The entity is not in a state the transition accepts
    #[error("Not eligible: {0}")]
    NotEligible(String),
}

pub type GuardResult<T> = Result<T, GuardError>;

impl From<GuardError> for DeliveryError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::HardStageExists(_) | GuardError::NotEligible(_) => {
                DeliveryError::PreconditionViolation(error.to_string())
            }
            GuardError::DeliveryInProgress(_) => {
                DeliveryError::InterruptedDelivery(error.to_string())
            }
        }
    }
}

/// Trait for implementing state transition guards
pub trait StateGuard<T: ?Sized> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Only staged samples may be hard staged
pub struct SampleStagedGuard;

impl StateGuard<SampleRecord> for SampleStagedGuard {
    fn check(&self, sample: &SampleRecord) -> GuardResult<()> {
        let state = sample.delivery_state();
        if state != DeliveryState::Staged {
            return Err(GuardError::NotEligible(format!(
                "sample {} is {state}, expected {}",
                sample.sample_id,
                DeliveryState::Staged
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Sample must be staged"
    }
}

/// The hard-stage destination must not exist yet
pub struct HardStageAbsentGuard;

impl StateGuard<Path> for HardStageAbsentGuard {
    fn check(&self, path: &Path) -> GuardResult<()> {
        // symlink_metadata so a dangling link still counts as present
        if path.symlink_metadata().is_ok() {
            return Err(GuardError::HardStageExists(path.display().to_string()));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Hard stage destination must not exist"
    }
}

/// What the orchestrator should do given the current project state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectDeliveryDecision {
    /// Go ahead with a delivery
    Proceed,
    /// Already delivered and not forced; report success without doing anything
    AlreadyDelivered,
    /// Some deliveries happened before; the operator must confirm
    ConfirmPartial,
}

/// Decide how a project delivery starts from the derived project state
pub fn project_delivery_decision(
    project_id: &str,
    state: DeliveryState,
    force: bool,
) -> GuardResult<ProjectDeliveryDecision> {
    match state {
        DeliveryState::Delivered if !force => Ok(ProjectDeliveryDecision::AlreadyDelivered),
        DeliveryState::InProgress => Err(GuardError::DeliveryInProgress(format!(
            "project {project_id} has a live delivery token"
        ))),
        DeliveryState::Partial => Ok(ProjectDeliveryDecision::ConfirmPartial),
        _ => Ok(ProjectDeliveryDecision::Proceed),
    }
}
