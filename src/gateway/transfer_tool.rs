//! Gateway backed by the ticket REST API and the transfer command line tools.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{DeliveryGateway, DeliveryProjectRecord, DeliveryTicketRequest, TransferStatus};
use crate::config::{TicketConfig, TransferConfig};
use crate::constants::tokens::MANUALLY_SET_UP;
use crate::error::{DeliveryError, DeliveryResult};
use crate::state_machine::states::DeliveryToken;

/// Wire payload of the ticket creation endpoint
#[derive(Debug, Serialize)]
struct TicketPayload {
    ngi_project_name: String,
    title: String,
    pi_id: Value,
    start_date: String,
    end_date: String,
    continuation_name: String,
    api_opaque_data: String,
    ngi_ready: bool,
    ngi_delivery_status: String,
    ngi_sensitive_data: bool,
    member_ids: Vec<Value>,
}

impl TicketPayload {
    fn from_request(request: &DeliveryTicketRequest) -> Self {
        Self {
            ngi_project_name: request.project_id.clone(),
            title: request.title(),
            pi_id: request
                .pi_identity
                .as_deref()
                .map(identity_value)
                .unwrap_or(Value::Null),
            start_date: request.window.start_str(),
            end_date: request.window.end_str(),
            continuation_name: String::new(),
            api_opaque_data: String::new(),
            ngi_ready: false,
            ngi_delivery_status: String::new(),
            ngi_sensitive_data: request.sensitive,
            member_ids: request
                .member_identities
                .iter()
                .map(|id| identity_value(id))
                .collect(),
        }
    }
}

/// Numeric identities go over the wire as numbers
fn identity_value(identity: &str) -> Value {
    identity
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(identity.to_string()))
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    name: Value,
}

/// Extract `X.Y.Z` following the word `version` in tool output
pub fn parse_tool_version(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word != "version" {
            continue;
        }
        let candidate = words.next()?;
        let parts: Vec<&str> = candidate.split('.').collect();
        let well_formed = parts.len() == 3
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        if well_formed {
            return Some(candidate.to_string());
        }
    }
    None
}

pub struct TransferToolGateway {
    client: Client,
    ticket: TicketConfig,
    transfer: TransferConfig,
}

impl TransferToolGateway {
    pub fn new(ticket: TicketConfig, transfer: TransferConfig) -> DeliveryResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(ticket.timeout_secs))
            .build()
            .map_err(|e| {
                DeliveryError::ConfigurationError(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            ticket,
            transfer,
        })
    }

    /// Run a tool and return its stdout; spawn failures and non-zero exits are errors
    async fn run_tool(&self, program: &str, args: &[&str]) -> DeliveryResult<String> {
        debug!(program = %program, args = ?args, "Invoking transfer tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                DeliveryError::ToolInvocationError(format!("Failed to run {program}: {e}"))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::ToolInvocationError(format!(
                "{program} {} exited with {}: {}{}",
                args.join(" "),
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl DeliveryGateway for TransferToolGateway {
    async fn check_version(&self) -> DeliveryResult<()> {
        let program = self.transfer.info_command.as_str();
        let output = Command::new(program)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                DeliveryError::ToolInvocationError(format!("Failed to run {program}: {e}"))
            })?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let found = parse_tool_version(&combined).ok_or_else(|| {
            DeliveryError::ToolInvocationError(format!(
                "Could not identify the {program} version from: {}",
                combined.trim()
            ))
        })?;
        if found != self.transfer.required_version {
            error!(
                found = %found,
                required = %self.transfer.required_version,
                "Unsupported transfer tool version, load the required version and retry"
            );
            return Err(DeliveryError::IncompatibleToolVersion {
                found,
                required: self.transfer.required_version.clone(),
            });
        }
        debug!(version = %found, "Transfer tool version accepted");
        Ok(())
    }

    async fn create_delivery_ticket(
        &self,
        request: &DeliveryTicketRequest,
    ) -> DeliveryResult<DeliveryProjectRecord> {
        let url = format!(
            "{}/ngi_delivery/project/create/",
            self.ticket.api_url.trim_end_matches('/')
        );
        let payload = TicketPayload::from_request(request);
        debug!(url = %url, title = %payload.title, "Creating delivery ticket");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.ticket.api_user, Some(&self.ticket.api_password))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::RemoteServiceError(format!(
                "Ticket API returned status {status}. Response: {body}. URL: {url}"
            )));
        }

        let created: TicketResponse = response.json().await?;
        let ticket_id = match created.name {
            Value::String(name) if !name.is_empty() => name,
            Value::Number(name) => name.to_string(),
            other => {
                return Err(DeliveryError::RemoteServiceError(format!(
                    "Ticket API returned no usable ticket name: {other}"
                )))
            }
        };

        info!(
            project_id = %request.project_id,
            ticket_id = %ticket_id,
            "Delivery ticket created"
        );
        Ok(DeliveryProjectRecord::from_request(ticket_id, request))
    }

    async fn start_transfer(&self, local_path: &Path, ticket_id: &str) -> DeliveryResult<DeliveryToken> {
        let path = local_path.display().to_string();
        let args = [path.as_str(), ticket_id];

        if self.transfer.hard_stage_only {
            warn!(
                command = %format!("{} {}", self.transfer.outbox_command, args.join(" ")),
                "Transfer not started, only hard staging done. Start it manually with this command"
            );
            return Ok(DeliveryToken::new(MANUALLY_SET_UP));
        }

        let stdout = self
            .run_tool(&self.transfer.outbox_command, &args)
            .await
            .map_err(|e| {
                error!(
                    path = %path,
                    ticket_id = %ticket_id,
                    error = %e,
                    "Transfer tool failed"
                );
                e
            })?;
        Ok(DeliveryToken::new(stdout.trim_end()))
    }

    async fn probe_status(&self, token: &DeliveryToken) -> DeliveryResult<TransferStatus> {
        let stdout = self
            .run_tool(&self.transfer.info_command, &["-i", token.as_str()])
            .await?;
        Ok(TransferStatus::parse(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::DateWindow;
    use chrono::NaiveDate;

    fn gateway(transfer: TransferConfig) -> TransferToolGateway {
        let ticket = TicketConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_user: "u".to_string(),
            api_password: "p".to_string(),
            validity_days: 45,
            timeout_secs: 1,
        };
        TransferToolGateway::new(ticket, transfer).unwrap()
    }

    #[test]
    fn test_parse_tool_version() {
        assert_eq!(
            parse_tool_version("moverinfo version 1.0.0\n"),
            Some("1.0.0".to_string())
        );
        assert_eq!(
            parse_tool_version("mover suite, version 2.3.11 (build 7)"),
            Some("2.3.11".to_string())
        );
        assert_eq!(parse_tool_version("version unknown"), None);
        assert_eq!(parse_tool_version("no version info here"), None);
    }

    #[test]
    fn test_ticket_payload() {
        let request = DeliveryTicketRequest {
            project_id: "P1".to_string(),
            pi_identity: Some("17".to_string()),
            sensitive: false,
            member_identities: vec!["18".to_string(), "ext-3".to_string()],
            window: DateWindow::starting(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(), 45),
        };
        let json = serde_json::to_value(TicketPayload::from_request(&request)).unwrap();
        assert_eq!(json["title"], "DELIVERY_P1_2024-01-10");
        assert_eq!(json["pi_id"], 17);
        assert_eq!(json["member_ids"], serde_json::json!([18, "ext-3"]));
        assert_eq!(json["end_date"], "2024-02-24");
        assert_eq!(json["ngi_sensitive_data"], false);
    }

    #[tokio::test]
    async fn test_hard_stage_only_returns_manual_token() {
        let gateway = gateway(TransferConfig {
            hard_stage_only: true,
            ..TransferConfig::default()
        });
        let token = gateway
            .start_transfer(Path::new("/hard/P1"), "delivery0001")
            .await
            .unwrap();
        assert_eq!(token.as_str(), MANUALLY_SET_UP);
        assert!(token.is_live());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_transfer_returns_trimmed_stdout() {
        let gateway = gateway(TransferConfig {
            outbox_command: "echo".to_string(),
            ..TransferConfig::default()
        });
        let token = gateway
            .start_transfer(Path::new("/hard/P1"), "delivery0001")
            .await
            .unwrap();
        assert_eq!(token.as_str(), "/hard/P1 delivery0001");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_is_a_tool_invocation_error() {
        let gateway = gateway(TransferConfig {
            outbox_command: "false".to_string(),
            info_command: "false".to_string(),
            ..TransferConfig::default()
        });
        let started = gateway
            .start_transfer(Path::new("/hard/P1"), "delivery0001")
            .await;
        assert!(matches!(started, Err(DeliveryError::ToolInvocationError(_))));

        let probed = gateway.probe_status(&DeliveryToken::new("T1")).await;
        assert!(matches!(probed, Err(DeliveryError::ToolInvocationError(_))));
    }

    #[tokio::test]
    async fn test_missing_tool_is_a_tool_invocation_error() {
        let gateway = gateway(TransferConfig {
            info_command: "definitely-not-a-transfer-tool".to_string(),
            ..TransferConfig::default()
        });
        let result = gateway.check_version().await;
        assert!(matches!(result, Err(DeliveryError::ToolInvocationError(_))));
    }
}
