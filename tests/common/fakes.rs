//! Scripted stand-ins for the remote gateway and the operator.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use delivery_core::confirmation::ConfirmationPort;
use delivery_core::error::{DeliveryError, DeliveryResult};
use delivery_core::gateway::{
    DeliveryGateway, DeliveryProjectRecord, DeliveryTicketRequest, TransferStatus,
};
use delivery_core::state_machine::DeliveryToken;

#[derive(Debug, Clone)]
pub struct StartedTransfer {
    pub local_path: PathBuf,
    pub ticket_id: String,
    /// Entries directly under the hard stage when the transfer started
    pub staged_entries: Vec<String>,
}

#[derive(Default)]
struct GatewayCalls {
    version_checks: usize,
    tickets: Vec<DeliveryTicketRequest>,
    transfers: Vec<StartedTransfer>,
    probes: usize,
}

/// Gateway whose answers are set up by the test
pub struct FakeGateway {
    incompatible_version: Option<String>,
    fail_tickets: bool,
    fail_transfers: bool,
    ticket_id: String,
    token: String,
    probe_script: Mutex<VecDeque<Result<TransferStatus, String>>>,
    probe_fallback: TransferStatus,
    calls: Mutex<GatewayCalls>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            incompatible_version: None,
            fail_tickets: false,
            fail_transfers: false,
            ticket_id: "delivery00042".to_string(),
            token: "TKN-0001".to_string(),
            probe_script: Mutex::new(VecDeque::new()),
            probe_fallback: TransferStatus::InProgress,
            calls: Mutex::new(GatewayCalls::default()),
        }
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incompatible_version(mut self, found: &str) -> Self {
        self.incompatible_version = Some(found.to_string());
        self
    }

    pub fn with_failing_tickets(mut self) -> Self {
        self.fail_tickets = true;
        self
    }

    pub fn with_failing_transfers(mut self) -> Self {
        self.fail_transfers = true;
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn with_ticket_id(mut self, ticket_id: &str) -> Self {
        self.ticket_id = ticket_id.to_string();
        self
    }

    /// Statuses returned by successive probes, before the fallback kicks in
    pub fn with_probes(self, statuses: impl IntoIterator<Item = TransferStatus>) -> Self {
        self.probe_script
            .lock()
            .extend(statuses.into_iter().map(Ok));
        self
    }

    pub fn with_probe_error(self, message: &str) -> Self {
        self.probe_script.lock().push_back(Err(message.to_string()));
        self
    }

    pub fn with_probe_fallback(mut self, status: TransferStatus) -> Self {
        self.probe_fallback = status;
        self
    }

    pub fn version_checks(&self) -> usize {
        self.calls.lock().version_checks
    }

    pub fn tickets(&self) -> Vec<DeliveryTicketRequest> {
        self.calls.lock().tickets.clone()
    }

    pub fn transfers(&self) -> Vec<StartedTransfer> {
        self.calls.lock().transfers.clone()
    }

    pub fn probes(&self) -> usize {
        self.calls.lock().probes
    }
}

fn entries_under(path: &Path) -> Vec<String> {
    let mut entries: Vec<String> = std::fs::read_dir(path)
        .map(|dir| {
            dir.filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries
}

#[async_trait]
impl DeliveryGateway for FakeGateway {
    async fn check_version(&self) -> DeliveryResult<()> {
        self.calls.lock().version_checks += 1;
        match &self.incompatible_version {
            Some(found) => Err(DeliveryError::IncompatibleToolVersion {
                found: found.clone(),
                required: "1.0.0".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn create_delivery_ticket(
        &self,
        request: &DeliveryTicketRequest,
    ) -> DeliveryResult<DeliveryProjectRecord> {
        self.calls.lock().tickets.push(request.clone());
        if self.fail_tickets {
            return Err(DeliveryError::RemoteServiceError(
                "ticket service returned 500".to_string(),
            ));
        }
        Ok(DeliveryProjectRecord::from_request(&self.ticket_id, request))
    }

    async fn start_transfer(&self, local_path: &Path, ticket_id: &str) -> DeliveryResult<DeliveryToken> {
        self.calls.lock().transfers.push(StartedTransfer {
            local_path: local_path.to_path_buf(),
            ticket_id: ticket_id.to_string(),
            staged_entries: entries_under(local_path),
        });
        if self.fail_transfers {
            return Err(DeliveryError::ToolInvocationError(
                "transfer tool exited with status 1".to_string(),
            ));
        }
        Ok(DeliveryToken::new(&self.token))
    }

    async fn probe_status(&self, _token: &DeliveryToken) -> DeliveryResult<TransferStatus> {
        self.calls.lock().probes += 1;
        match self.probe_script.lock().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(DeliveryError::ToolInvocationError(message)),
            None => Ok(self.probe_fallback.clone()),
        }
    }
}

/// Operator that answers from a script and remembers every question
pub struct ScriptedConfirmation {
    answers: Mutex<VecDeque<bool>>,
    fallback: Option<bool>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    pub fn always_yes() -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            fallback: Some(true),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers in order; running out reads as closed input
    pub fn answers(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Any question fails the test run as closed input
    pub fn no_answers() -> Self {
        Self::answers(Vec::new())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl ConfirmationPort for ScriptedConfirmation {
    fn confirm(&self, prompt: &str) -> DeliveryResult<bool> {
        self.prompts.lock().push(prompt.to_string());
        self.answers
            .lock()
            .pop_front()
            .or(self.fallback)
            .ok_or_else(|| DeliveryError::IoError("no scripted answer left".to_string()))
    }
}
