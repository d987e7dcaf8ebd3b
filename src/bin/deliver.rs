//! # deliver
//!
//! Operator entry point: hard stage and start the delivery of projects,
//! single samples or run folders, and monitor deliveries in flight.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

use delivery_core::config::{ConfigManager, DeliveryConfig};
use delivery_core::confirmation::{ConfirmationPort, TerminalConfirmation};
use delivery_core::gateway::{
    DeliveryGateway, HttpIdentityResolver, HttpOrderPortal, OrderPortal, TransferToolGateway,
};
use delivery_core::logging::init_structured_logging;
use delivery_core::metadata::{HttpMetadataStore, HttpSummaryStore, MetadataStore, SummaryStore};
use delivery_core::notification::{report_failure, FailureReport, HttpMailRelay, OperatorNotifier};
use delivery_core::orchestration::{
    resolve_contacts, ContactRequest, DeliveryMonitor, DeliveryOptions, MonitorOutcome,
    ProjectDeliverer,
};
use delivery_core::state_machine::{DeliveryBookkeeping, SampleDeliveryOutcome};

#[derive(Parser)]
#[command(name = "deliver")]
#[command(about = "Deliver sequencing projects and monitor deliveries in flight")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: $DELIVERY_CONFIG_PATH or config/delivery.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Deliver projects even when they are already marked as delivered
    #[arg(long, global = true)]
    force: bool,

    /// Mark the delivery as sensitive (default)
    #[arg(long, global = true, overrides_with = "no_sensitive")]
    sensitive: bool,

    /// Mark the delivery as non-sensitive
    #[arg(long, global = true, overrides_with = "sensitive")]
    no_sensitive: bool,

    /// Stop after hard staging; the transfer is started by hand
    #[arg(long, global = true)]
    hard_stage_only: bool,

    /// PI email, takes precedence over the order portal
    #[arg(long, global = true)]
    pi_email: Option<String>,

    /// Extra member email to add to the delivery ticket (repeatable)
    #[arg(long = "add-user", global = true)]
    add_user: Vec<String>,

    /// Operator email notified when a delivery fails (repeatable)
    #[arg(long, global = true)]
    operator: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deliver every staged sample of one or more projects
    Project {
        #[arg(required = true)]
        project_ids: Vec<String>,
    },

    /// Hard stage individual samples of a project without starting a transfer
    Sample {
        project_id: String,
        #[arg(required = true)]
        sample_ids: Vec<String>,
    },

    /// Deliver the archived run folder of a flowcell
    RunFolder { project_id: String, fcid: String },

    /// Poll deliveries in flight until they finish
    Monitor {
        #[arg(required = true)]
        project_ids: Vec<String>,
    },
}

/// Adapters shared by every command
struct Services {
    config: DeliveryConfig,
    bookkeeping: DeliveryBookkeeping,
    summary: Option<Arc<dyn SummaryStore>>,
    gateway: Arc<dyn DeliveryGateway>,
    notifier: Option<Arc<dyn OperatorNotifier>>,
}

impl Services {
    fn build(cli: &Cli) -> Result<Self> {
        let manager = match &cli.config {
            Some(path) => ConfigManager::load_from_path(path),
            None => ConfigManager::load(),
        }
        .context("Failed to load delivery configuration")?;
        info!(
            config_path = %manager.config_path().display(),
            "Configuration loaded"
        );

        let mut config = manager.config().clone();
        config.transfer.hard_stage_only |= cli.hard_stage_only;

        let metadata: Arc<dyn MetadataStore> = Arc::new(HttpMetadataStore::new(&config.metadata_store)?);
        let summary: Option<Arc<dyn SummaryStore>> = match &config.summary_store {
            Some(summary_config) => Some(Arc::new(HttpSummaryStore::new(summary_config)?)),
            None => None,
        };
        Self::assemble(config, metadata, summary)
    }

    fn assemble(
        config: DeliveryConfig,
        metadata: Arc<dyn MetadataStore>,
        summary: Option<Arc<dyn SummaryStore>>,
    ) -> Result<Self> {
        let mut bookkeeping = DeliveryBookkeeping::new(metadata);
        if let Some(summary) = &summary {
            bookkeeping = bookkeeping.with_summary_store(summary.clone(), config.delivery.record_metadata);
        }

        let gateway: Arc<dyn DeliveryGateway> = Arc::new(TransferToolGateway::new(
            config.ticket.clone(),
            config.transfer.clone(),
        )?);

        let notifier: Option<Arc<dyn OperatorNotifier>> = match &config.notification {
            Some(notification) => Some(Arc::new(HttpMailRelay::new(notification)?)),
            None => None,
        };

        Ok(Self {
            config,
            bookkeeping,
            summary,
            gateway,
            notifier,
        })
    }

    fn options(&self, cli: &Cli) -> DeliveryOptions {
        DeliveryOptions {
            force: cli.force,
            sensitive: !cli.no_sensitive,
            delivery_group_id: self.config.transfer.delivery_group_id,
            ticket_validity_days: self.config.ticket.validity_days,
        }
    }

    /// `--operator` wins over the configured recipients
    fn operators(&self, cli: &Cli) -> Vec<String> {
        if !cli.operator.is_empty() {
            return cli.operator.clone();
        }
        self.config
            .notification
            .as_ref()
            .map(|n| n.operators.clone())
            .unwrap_or_default()
    }

    async fn report(&self, cli: &Cli, report: FailureReport) {
        let operators = self.operators(cli);
        report_failure(self.notifier.as_deref(), &operators, &report).await;
    }

    fn order_portal(&self) -> Result<Option<Arc<dyn OrderPortal>>> {
        match (&self.config.order_portal, &self.summary) {
            (Some(portal_config), Some(summary)) => {
                let portal: Arc<dyn OrderPortal> =
                    Arc::new(HttpOrderPortal::new(portal_config, summary.clone())?);
                Ok(Some(portal))
            }
            _ => Ok(None),
        }
    }

    /// Deliverer for local hard staging only; no remote directory is consulted
    fn staging_deliverer(&self, cli: &Cli) -> ProjectDeliverer {
        let confirmation: Arc<dyn ConfirmationPort> = Arc::new(TerminalConfirmation);
        ProjectDeliverer::new(
            self.bookkeeping.clone(),
            self.gateway.clone(),
            confirmation,
            self.config.paths.clone(),
            self.options(cli),
        )
    }

    /// Deliverer that opens delivery tickets, with its contacts resolved
    async fn ticketing_deliverer(&self, cli: &Cli, project_id: &str) -> Result<ProjectDeliverer> {
        let identities = HttpIdentityResolver::new(&self.config.ticket)?;
        let portal = self.order_portal()?;
        let request = ContactRequest {
            pi_email: cli.pi_email.clone(),
            member_emails: cli.add_user.clone(),
            add_project_owner: self.config.delivery.add_project_owner,
        };
        let contacts = resolve_contacts(project_id, &identities, portal.as_deref(), &request)
            .await
            .with_context(|| format!("Cannot resolve delivery contacts for {project_id}"))?;

        Ok(self.staging_deliverer(cli).with_contacts(contacts))
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let services = Services::build(&cli)?;
    execute(&services, &cli).await
}

/// Returns whether every requested operation succeeded
async fn execute(services: &Services, cli: &Cli) -> Result<bool> {
    let mut all_ok = true;

    match &cli.command {
        Commands::Project { project_ids } => {
            for project_id in project_ids {
                let outcome: Result<bool> = match services.ticketing_deliverer(cli, project_id).await {
                    Ok(deliverer) => deliverer.deliver_project(project_id).await.map_err(Into::into),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(true) => info!(project_id = %project_id, "Project delivery done"),
                    Ok(false) => {
                        error!(project_id = %project_id, "Project was not delivered");
                        all_ok = false;
                    }
                    Err(e) => {
                        services
                            .report(cli, FailureReport::new(project_id, None, "project", format!("{e:#}")))
                            .await;
                        all_ok = false;
                    }
                }
            }
        }
        Commands::Sample {
            project_id,
            sample_ids,
        } => {
            let deliverer = services.staging_deliverer(cli);
            for sample_id in sample_ids {
                let outcome = deliverer
                    .deliver_samples(project_id, std::slice::from_ref(sample_id))
                    .await;
                match outcome.as_deref() {
                    Ok([(_, SampleDeliveryOutcome::HardStaged)]) => {
                        info!(project_id = %project_id, sample_id = %sample_id, "Sample hard staged")
                    }
                    Ok([(_, SampleDeliveryOutcome::NotEligible(state))]) => {
                        error!(
                            project_id = %project_id,
                            sample_id = %sample_id,
                            delivery_status = %state,
                            "Sample was not hard staged"
                        );
                        all_ok = false;
                    }
                    Ok(_) => all_ok = false,
                    Err(e) => {
                        let report =
                            FailureReport::new(project_id, Some(sample_id.clone()), "sample", e.to_string());
                        services.report(cli, report).await;
                        all_ok = false;
                    }
                }
            }
        }
        Commands::RunFolder { project_id, fcid } => {
            let deliverer = services.ticketing_deliverer(cli, project_id).await?;
            if !deliverer.deliver_run_folder(project_id, fcid).await? {
                error!(project_id = %project_id, fcid = %fcid, "Run folder was not delivered");
                all_ok = false;
            }
        }
        Commands::Monitor { project_ids } => {
            let monitor = DeliveryMonitor::from_config(
                services.bookkeeping.clone(),
                services.gateway.clone(),
                services.config.paths.clone(),
                &services.config.monitor,
            )?;
            for project_id in project_ids {
                match monitor.monitor_project(project_id).await {
                    Ok(MonitorOutcome::Completed {
                        outcome,
                        project_state,
                    }) => info!(
                        project_id = %project_id,
                        outcome = %outcome,
                        project_state = %project_state,
                        "Monitoring finished"
                    ),
                    Ok(MonitorOutcome::NotUnderDelivery(state)) => info!(
                        project_id = %project_id,
                        delivery_status = %state,
                        "Nothing to monitor"
                    ),
                    Err(e) if e.is_tool_failure() => {
                        return Err(e).with_context(|| format!("Transfer tool failed while monitoring {project_id}"));
                    }
                    Err(e) => {
                        error!(project_id = %project_id, error = %e, "Monitoring failed");
                        all_ok = false;
                    }
                }
            }
        }
    }

    Ok(all_ok)
}

#[tokio::main]
async fn main() {
    init_structured_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %format!("{e:#}"), "deliver failed");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}
