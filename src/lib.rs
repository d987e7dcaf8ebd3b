#![allow(clippy::doc_markdown)] // Allow technical terms like PI, DDS in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Delivery Core
//!
//! Delivery state machine and reconciliation engine for handing sequencing
//! data over to its owners.
//!
//! ## Overview
//!
//! A project is delivered in two phases. An operator-initiated run hard stages
//! every staged sample of the project, opens a delivery ticket on the remote
//! side and starts a transfer whose token is persisted on the project. A
//! separate monitor run later polls that token until the transfer is delivered
//! or the configured ceiling is reached, and reconciles sample and project
//! state accordingly.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Delivery states, state derivation, sample lifecycle and bookkeeping
//! - [`staging`] - Soft-stage inspection, hard-stage copies and the delivery lock
//! - [`gateway`] - Transfer tool, delivery ticket and directory lookups
//! - [`metadata`] - Metadata and summary store ports with HTTP and in-memory adapters
//! - [`orchestration`] - Project delivery and delivery monitoring workflows
//! - [`config`] - TOML configuration with environment overrides
//! - [`confirmation`] - Operator yes/no prompts
//! - [`notification`] - Failure reports to operators
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use delivery_core::config::ConfigManager;
//! use delivery_core::metadata::{HttpMetadataStore, MetadataStore};
//! use delivery_core::orchestration::DeliveryMonitor;
//! use delivery_core::state_machine::DeliveryBookkeeping;
//! use delivery_core::gateway::TransferToolGateway;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let metadata: Arc<dyn MetadataStore> = Arc::new(HttpMetadataStore::new(&config.metadata_store)?);
//! let gateway = Arc::new(TransferToolGateway::new(config.ticket.clone(), config.transfer.clone())?);
//! let monitor = DeliveryMonitor::from_config(
//!     DeliveryBookkeeping::new(metadata),
//!     gateway,
//!     config.paths.clone(),
//!     &config.monitor,
//! )?;
//!
//! let outcome = monitor.monitor_project("P12345").await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod confirmation;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metadata;
pub mod notification;
pub mod orchestration;
pub mod staging;
pub mod state_machine;
pub mod utils;

pub use config::{ConfigManager, DeliveryConfig};
pub use error::{DeliveryError, DeliveryResult};
pub use orchestration::{DeliveryMonitor, DeliveryOptions, MonitorOutcome, ProjectDeliverer};
pub use state_machine::{DeliveryRecord, DeliveryState, DeliveryToken};
