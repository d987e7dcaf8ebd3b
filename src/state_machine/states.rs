use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{is_sentinel_token, tokens};
use crate::utils::serde::{
    deserialize_lenient_state, deserialize_null_as_empty, deserialize_token_or_sentinel,
};

/// Delivery states shared by projects and samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// Nothing has been delivered yet
    NotDelivered,
    /// Soft-staged and waiting for a hard stage
    Staged,
    /// Hard-staged and handed to the transfer mechanism
    InProgress,
    /// Some deliveries happened but the project is not complete
    Partial,
    /// Delivery confirmed
    Delivered,
    /// Delivery failed or timed out
    Failed,
    /// Excluded by an operator
    Aborted,
}

impl DeliveryState {
    /// Check whether the state counts towards project completion
    pub fn counts_as_complete(&self) -> bool {
        matches!(self, Self::Delivered | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDelivered => "NOT_DELIVERED",
            Self::Staged => "STAGED",
            Self::InProgress => "IN_PROGRESS",
            Self::Partial => "PARTIAL",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_DELIVERED" => Ok(Self::NotDelivered),
            "STAGED" => Ok(Self::Staged),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "PARTIAL" => Ok(Self::Partial),
            "DELIVERED" => Ok(Self::Delivered),
            "FAILED" => Ok(Self::Failed),
            "ABORTED" => Ok(Self::Aborted),
            _ => Err(format!("Invalid delivery state: {s}")),
        }
    }
}

impl Default for DeliveryState {
    fn default() -> Self {
        Self::NotDelivered
    }
}

/// Opaque handle of one remote transfer operation.
///
/// The sentinel value means "no token"; an empty string reads the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryToken(String);

impl DeliveryToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The "not under delivery" sentinel
    pub fn none() -> Self {
        Self(tokens::NO_TOKEN.to_string())
    }

    /// A token that identifies an in-flight transfer
    pub fn is_live(&self) -> bool {
        !is_sentinel_token(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Live token value, if any
    pub fn live(&self) -> Option<&str> {
        self.is_live().then_some(self.0.as_str())
    }
}

impl Default for DeliveryToken {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery fields persisted on a project or sample record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Explicitly written status marker
    #[serde(default, deserialize_with = "deserialize_lenient_state")]
    pub delivery_status: Option<DeliveryState>,
    #[serde(default, deserialize_with = "deserialize_token_or_sentinel")]
    pub delivery_token: DeliveryToken,
    /// Remote delivery-project identifiers, append-only
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub delivery_projects: Vec<String>,
    #[serde(default)]
    pub delivery_started: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Derived delivery state of a project.
    ///
    /// First match wins: live token, persisted `DELIVERED` marker, any
    /// delivery project on record, otherwise not delivered.
    pub fn derived_state(&self) -> DeliveryState {
        if self.delivery_token.is_live() {
            DeliveryState::InProgress
        } else if self.delivery_status == Some(DeliveryState::Delivered) {
            DeliveryState::Delivered
        } else if !self.delivery_projects.is_empty() {
            DeliveryState::Partial
        } else {
            DeliveryState::NotDelivered
        }
    }

    /// State of a sample, which is always the explicitly written marker
    pub fn explicit_state(&self) -> DeliveryState {
        self.delivery_status.unwrap_or_default()
    }

    pub fn has_delivery_project(&self, delivery_project: &str) -> bool {
        self.delivery_projects.iter().any(|p| p == delivery_project)
    }
}
