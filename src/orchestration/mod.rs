//! # Delivery Orchestration
//!
//! Operator-facing workflows built on the state machine, staging and gateway
//! layers:
//!
//! - **ProjectDeliverer**: hard stages a project (or single samples, or a run
//!   folder archive), opens the delivery ticket and starts the transfer
//! - **DeliveryMonitor**: polls an in-flight transfer and reconciles sample and
//!   project state once it ends
//! - **Contacts**: resolves the PI and member identities recorded on the ticket

pub mod contacts;
pub mod delivery_monitor;
pub mod project_deliverer;

pub use contacts::{resolve_contacts, ContactRequest, DeliveryContacts};
pub use delivery_monitor::{DeliveryMonitor, MonitorOutcome};
pub use project_deliverer::{DeliveryOptions, ProjectDeliverer};
