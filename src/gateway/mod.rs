//! # Remote Delivery Gateway
//!
//! Ports for everything that happens on the remote side of a delivery: the
//! delivery ticket, the transfer itself and its status probe, plus the
//! directory lookups that supply ticket contacts.

pub mod directory;
pub mod transfer_tool;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::constants::ticket::{DATE_FORMAT, TITLE_PREFIX};
use crate::error::DeliveryResult;
use crate::state_machine::states::DeliveryToken;

pub use directory::{
    HttpIdentityResolver, HttpOrderPortal, IdentityResolver, OrderDetail, OrderPortal,
};
pub use transfer_tool::TransferToolGateway;

/// Status reported by the transfer tool for one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Accepted,
    InProgress,
    Failed,
    Delivered,
    /// Anything the tool reports that is not in the known vocabulary
    Unknown(String),
}

impl TransferStatus {
    /// Parse probe output; the status is everything before the first `:`
    pub fn parse(output: &str) -> Self {
        let status = output.split(':').next().unwrap_or_default().trim();
        match status {
            "Accepted" => Self::Accepted,
            "InProgress" => Self::InProgress,
            "Failed" => Self::Failed,
            "Delivered" => Self::Delivered,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Only a delivered transfer ends polling on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => f.write_str("Accepted"),
            Self::InProgress => f.write_str("InProgress"),
            Self::Failed => f.write_str("Failed"),
            Self::Delivered => f.write_str("Delivered"),
            Self::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// Validity window of a delivery ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn starting(start: NaiveDate, validity_days: i64) -> Self {
        Self {
            start,
            end: start + Duration::days(validity_days),
        }
    }

    pub fn starting_today(validity_days: i64) -> Self {
        Self::starting(Utc::now().date_naive(), validity_days)
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Everything needed to open a delivery ticket
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTicketRequest {
    pub project_id: String,
    pub pi_identity: Option<String>,
    pub sensitive: bool,
    pub member_identities: Vec<String>,
    pub window: DateWindow,
}

impl DeliveryTicketRequest {
    /// `DELIVERY_<project>_<start date>`
    pub fn title(&self) -> String {
        format!("{TITLE_PREFIX}_{}_{}", self.project_id, self.window.start_str())
    }
}

/// A created delivery ticket. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryProjectRecord {
    pub ticket_id: String,
    pub project_id: String,
    pub pi_identity: Option<String>,
    pub sensitive: bool,
    pub member_identities: Vec<String>,
    pub window: DateWindow,
}

impl DeliveryProjectRecord {
    pub fn from_request(ticket_id: impl Into<String>, request: &DeliveryTicketRequest) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            project_id: request.project_id.clone(),
            pi_identity: request.pi_identity.clone(),
            sensitive: request.sensitive,
            member_identities: request.member_identities.clone(),
            window: request.window,
        }
    }
}

/// Remote side of a delivery
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Fail unless the transfer tool is the supported version
    async fn check_version(&self) -> DeliveryResult<()>;

    async fn create_delivery_ticket(
        &self,
        request: &DeliveryTicketRequest,
    ) -> DeliveryResult<DeliveryProjectRecord>;

    /// Hand the hard-staged tree to the transfer tool. An empty token means
    /// the tool accepted nothing.
    async fn start_transfer(&self, local_path: &Path, ticket_id: &str) -> DeliveryResult<DeliveryToken>;

    async fn probe_status(&self, token: &DeliveryToken) -> DeliveryResult<TransferStatus>;
}
