//! # Delivery Configuration
//!
//! Explicit, validated configuration for the delivery core. Values come from a
//! single TOML file plus `DELIVERY__SECTION__KEY` environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use delivery_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let ceiling = manager.config().monitor.max_delivery_duration()?;
//! let poll = manager.config().monitor.poll_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod paths;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{monitor, ticket, transfer};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;
pub use paths::PathContext;

/// Root configuration structure mirroring `delivery.toml`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Staging path templates
    pub paths: PathsConfig,

    /// Transfer tool invocation
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Reconciliation loop settings
    pub monitor: MonitorConfig,

    /// Remote delivery ticket API
    pub ticket: TicketConfig,

    /// Per-project/per-sample metadata store
    pub metadata_store: MetadataStoreConfig,

    /// Secondary summary store, optional
    #[serde(default)]
    pub summary_store: Option<SummaryStoreConfig>,

    /// Order portal, optional; without it contacts are not resolved
    #[serde(default)]
    pub order_portal: Option<OrderPortalConfig>,

    /// Delivery behaviour switches
    #[serde(default)]
    pub delivery: DeliveryBehaviourConfig,

    /// Mail relay for failure reports, optional
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Soft-stage root of a project, e.g. `/proj/stage/_PROJECTID_`
    pub soft_stage: String,
    /// Hard-stage root of a project, e.g. `/proj/delivery_hard/_PROJECTID_`
    pub hard_stage: String,
    /// Directory holding run-folder archives, e.g. `/proj/archives/_FCID_`
    #[serde(default)]
    pub run_folder_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default = "default_outbox_command")]
    pub outbox_command: String,
    #[serde(default = "default_info_command")]
    pub info_command: String,
    #[serde(default = "default_required_version")]
    pub required_version: String,
    /// Group assigned to every hard-staged entry before the transfer starts
    #[serde(default = "default_delivery_group_id")]
    pub delivery_group_id: u32,
    /// Stop after hard staging and let the operator start the transfer
    #[serde(default)]
    pub hard_stage_only: bool,
}

fn default_outbox_command() -> String {
    transfer::OUTBOX_COMMAND.to_string()
}

fn default_info_command() -> String {
    transfer::INFO_COMMAND.to_string()
}

fn default_required_version() -> String {
    transfer::REQUIRED_VERSION.to_string()
}

fn default_delivery_group_id() -> u32 {
    transfer::DELIVERY_GROUP_ID
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            outbox_command: default_outbox_command(),
            info_command: default_info_command(),
            required_version: default_required_version(),
            delivery_group_id: default_delivery_group_id(),
            hard_stage_only: false,
        }
    }
}

/// Monitor settings.
///
/// `max_delivery_hours` has no default. Deliveries used to be cut off after
/// 7 days while the operator message quoted 48 hours, so it must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub max_delivery_hours: Option<u64>,
}

fn default_poll_interval_secs() -> u64 {
    monitor::POLL_INTERVAL.as_secs()
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Wall-clock ceiling for one delivery
    pub fn max_delivery_duration(&self) -> ConfigResult<Duration> {
        let hours = self.max_delivery_hours.ok_or_else(|| {
            ConfigurationError::missing_required_field(
                "max_delivery_hours",
                format!(
                    "[monitor]: no default is assumed; the historical ceiling was {} hours \
                     while the operator message stated {} hours, set one explicitly",
                    monitor::HISTORICAL_ENFORCED_CEILING_HOURS,
                    monitor::HISTORICAL_MESSAGE_CEILING_HOURS
                ),
            )
        })?;
        let secs = hours.checked_mul(3600).ok_or_else(|| {
            ConfigurationError::invalid_value(
                "max_delivery_hours",
                hours.to_string(),
                "ceiling does not fit in seconds",
            )
        })?;
        Ok(Duration::from_secs(secs))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketConfig {
    pub api_url: String,
    pub api_user: String,
    pub api_password: String,
    #[serde(default = "default_validity_days")]
    pub validity_days: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_validity_days() -> i64 {
    ticket::VALIDITY_DAYS
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataStoreConfig {
    pub base_url: String,
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummaryStoreConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderPortalConfig {
    pub api_url: String,
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Endpoint accepting `{to, subject, content}` JSON messages
    pub relay_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Recipients used when no `--operator` is given
    #[serde(default)]
    pub operators: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeliveryBehaviourConfig {
    /// Record delivery projects in the summary store
    #[serde(default)]
    pub record_metadata: bool,
    /// Add the order owner to the remote delivery project members
    #[serde(default)]
    pub add_project_owner: bool,
}

impl DeliveryConfig {
    /// Validate the loaded configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.paths.soft_stage.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "soft_stage",
                "[paths]",
            ));
        }
        if self.paths.hard_stage.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "hard_stage",
                "[paths]",
            ));
        }
        if self.paths.soft_stage == self.paths.hard_stage {
            return Err(ConfigurationError::invalid_value(
                "hard_stage",
                self.paths.hard_stage.clone(),
                "hard stage must differ from soft stage",
            ));
        }

        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "poll_interval_secs",
                "0",
                "poll interval must be positive",
            ));
        }
        let ceiling = self.monitor.max_delivery_duration()?;
        if ceiling.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "max_delivery_hours",
                "0",
                "ceiling must be positive",
            ));
        }

        if self.ticket.validity_days <= 0 {
            return Err(ConfigurationError::invalid_value(
                "validity_days",
                self.ticket.validity_days.to_string(),
                "ticket validity must be at least one day",
            ));
        }

        if self.delivery.record_metadata && self.summary_store.is_none() {
            return Err(ConfigurationError::missing_required_field(
                "summary_store",
                "record_metadata = true requires a [summary_store] section",
            ));
        }

        if let Some(notification) = &self.notification {
            if notification.relay_url.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "relay_url",
                    "[notification]",
                ));
            }
        }

        Ok(())
    }
}
