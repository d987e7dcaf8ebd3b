//! # Operator Notification
//!
//! When a project or sample command fails, the operators named on the command
//! line are told about it through a mail relay. Notification never changes the
//! outcome of the command: a relay failure is logged next to the original
//! error and the command still fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::NotificationConfig;
use crate::error::{DeliveryError, DeliveryResult};

const RELAY_TOKEN_HEADER: &str = "X-Relay-Token";

/// What failed, for whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub project_id: String,
    pub sample_id: Option<String>,
    /// Subcommand that failed, e.g. `project`
    pub command: String,
    pub reason: String,
}

impl FailureReport {
    pub fn new(
        project_id: impl Into<String>,
        sample_id: Option<String>,
        command: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            sample_id,
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// `P1` or `P1/S1`
    pub fn target(&self) -> String {
        match &self.sample_id {
            Some(sample_id) => format!("{}/{sample_id}", self.project_id),
            None => self.project_id.clone(),
        }
    }

    pub fn subject(&self) -> String {
        format!("[ERROR] processing failed: {}", self.target())
    }

    pub fn body(&self) -> String {
        format!(
            "Project: {}\nSample: {}\nCommand: {}\n\nAdditional information: {}\n",
            self.project_id,
            self.sample_id.as_deref().unwrap_or("-"),
            self.command,
            self.reason
        )
    }
}

/// Sink for failure reports
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, recipients: &[String], report: &FailureReport) -> DeliveryResult<()>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a [String],
    subject: String,
    content: String,
}

/// Mail relay reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpMailRelay {
    client: Client,
    relay_url: String,
    api_token: Option<String>,
}

impl HttpMailRelay {
    pub fn new(config: &NotificationConfig) -> DeliveryResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DeliveryError::ConfigurationError(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            api_token: config.api_token.clone(),
        })
    }
}

#[async_trait]
impl OperatorNotifier for HttpMailRelay {
    async fn notify(&self, recipients: &[String], report: &FailureReport) -> DeliveryResult<()> {
        let message = RelayMessage {
            to: recipients,
            subject: report.subject(),
            content: report.body(),
        };
        debug!(url = %self.relay_url, recipients = ?recipients, "Sending failure report");

        let mut request = self.client.post(&self.relay_url).json(&message);
        if let Some(token) = &self.api_token {
            request = request.header(RELAY_TOKEN_HEADER, token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::RemoteServiceError(format!(
                "Mail relay returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

/// Log a failed command and tell the operators about it.
///
/// Returns whether the operators were notified.
pub async fn report_failure(
    notifier: Option<&dyn OperatorNotifier>,
    operators: &[String],
    report: &FailureReport,
) -> bool {
    let target = report.target();
    let (Some(notifier), false) = (notifier, operators.is_empty()) else {
        error!(
            target_id = %target,
            command = %report.command,
            reason = %report.reason,
            "Processing failed"
        );
        return false;
    };

    match notifier.notify(operators, report).await {
        Ok(()) => {
            error!(
                target_id = %target,
                command = %report.command,
                reason = %report.reason,
                operators = ?operators,
                "Processing failed, operators have been notified"
            );
            true
        }
        Err(e) => {
            error!(
                target_id = %target,
                command = %report.command,
                reason = %report.reason,
                operators = ?operators,
                notify_error = %e,
                "Processing failed, but operators could not be notified"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Vec<String>, FailureReport)>>,
        fail: bool,
    }

    #[async_trait]
    impl OperatorNotifier for RecordingNotifier {
        async fn notify(&self, recipients: &[String], report: &FailureReport) -> DeliveryResult<()> {
            if self.fail {
                return Err(DeliveryError::RemoteServiceError("relay down".into()));
            }
            self.sent.lock().push((recipients.to_vec(), report.clone()));
            Ok(())
        }
    }

    fn report() -> FailureReport {
        FailureReport::new("P1", Some("S1".into()), "sample", "Hard stage already present")
    }

    #[test]
    fn test_report_text() {
        let report = report();
        assert_eq!(report.subject(), "[ERROR] processing failed: P1/S1");
        assert!(report.body().contains("Project: P1\nSample: S1\nCommand: sample"));
        assert!(report.body().contains("Hard stage already present"));

        let project_only = FailureReport::new("P1", None, "project", "boom");
        assert_eq!(project_only.target(), "P1");
        assert!(project_only.body().contains("Sample: -"));
    }

    #[tokio::test]
    async fn test_operators_receive_report() {
        let notifier = RecordingNotifier::default();
        let operators = vec!["ops@example.org".to_string()];

        assert!(report_failure(Some(&notifier), &operators, &report()).await);

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, operators);
        assert_eq!(sent[0].1, report());
    }

    #[tokio::test]
    async fn test_no_operators_sends_nothing() {
        let notifier = RecordingNotifier::default();

        assert!(!report_failure(Some(&notifier), &[], &report()).await);
        assert!(!report_failure(None, &["ops@example.org".to_string()], &report()).await);
        assert!(notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_relay_failure_is_reported_not_raised() {
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };

        assert!(!report_failure(Some(&notifier), &["ops@example.org".to_string()], &report()).await);
    }
}
