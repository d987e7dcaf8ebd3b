//! Contact directories: person lookup by email and order details.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{OrderPortalConfig, TicketConfig};
use crate::error::{DeliveryError, DeliveryResult};
use crate::metadata::SummaryStore;

const ORDER_PORTAL_KEY_HEADER: &str = "X-OrderPortal-API-key";

/// Resolve a contact email to a remote party identifier
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Exactly one match is required
    async fn resolve_email(&self, email: &str) -> DeliveryResult<String>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFields {
    #[serde(default)]
    pub project_pi_email: Option<String>,
    /// Bioinformatics contact
    #[serde(default)]
    pub project_bx_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderOwner {
    #[serde(default)]
    pub email: Option<String>,
}

/// Order placed for a project
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderDetail {
    #[serde(default)]
    pub fields: OrderFields,
    #[serde(default)]
    pub owner: Option<OrderOwner>,
}

impl OrderDetail {
    pub fn pi_email(&self) -> Option<&str> {
        self.fields.project_pi_email.as_deref()
    }

    pub fn bioinfo_email(&self) -> Option<&str> {
        self.fields.project_bx_email.as_deref()
    }

    pub fn owner_email(&self) -> Option<&str> {
        self.owner.as_ref().and_then(|o| o.email.as_deref())
    }
}

#[async_trait]
pub trait OrderPortal: Send + Sync {
    async fn order_detail(&self, project_id: &str) -> DeliveryResult<OrderDetail>;
}

fn build_client(timeout_secs: u64) -> DeliveryResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DeliveryError::ConfigurationError(format!("Failed to build HTTP client: {e}")))
}

/// Person search on the ticket API
#[derive(Debug, Clone)]
pub struct HttpIdentityResolver {
    client: Client,
    api_url: String,
    user: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PersonSearch {
    matches: Option<Vec<PersonMatch>>,
}

#[derive(Debug, Deserialize)]
struct PersonMatch {
    id: Value,
}

impl HttpIdentityResolver {
    pub fn new(config: &TicketConfig) -> DeliveryResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            user: config.api_user.clone(),
            password: config.api_password.clone(),
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve_email(&self, email: &str) -> DeliveryResult<String> {
        let url = format!("{}/person/search/", self.api_url);
        debug!(url = %url, email = %email, "Searching person by email");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .query(&[("email_i", email)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::RemoteServiceError(format!(
                "Person search for {email} returned {status}: {body}"
            )));
        }

        let search: PersonSearch = response.json().await?;
        let matches = search.matches.ok_or_else(|| {
            DeliveryError::RemoteServiceError("Person search returned unexpected data".to_string())
        })?;
        match matches.as_slice() {
            [single] => match &single.id {
                Value::String(id) => Ok(id.clone()),
                Value::Number(id) => Ok(id.to_string()),
                other => Err(DeliveryError::RemoteServiceError(format!(
                    "Person search returned an unusable id for {email}: {other}"
                ))),
            },
            [] => Err(DeliveryError::RemoteServiceError(format!(
                "No person found for email {email}"
            ))),
            _ => Err(DeliveryError::RemoteServiceError(format!(
                "More than one person found for email {email}"
            ))),
        }
    }
}

/// Order portal client; the portal id of a project comes from the summary store
pub struct HttpOrderPortal {
    client: Client,
    api_url: String,
    api_token: String,
    summary: Arc<dyn SummaryStore>,
}

impl HttpOrderPortal {
    pub fn new(config: &OrderPortalConfig, summary: Arc<dyn SummaryStore>) -> DeliveryResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            summary,
        })
    }
}

#[async_trait]
impl OrderPortal for HttpOrderPortal {
    async fn order_detail(&self, project_id: &str) -> DeliveryResult<OrderDetail> {
        let portal_id = self.summary.order_portal_id(project_id).await?;
        let url = format!("{}/v1/order/{portal_id}", self.api_url);
        debug!(url = %url, project_id = %project_id, "Fetching order detail");

        let response = self
            .client
            .get(&url)
            .header(ORDER_PORTAL_KEY_HEADER, &self.api_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::RemoteServiceError(format!(
                "Order {portal_id} of project {project_id} returned {status}: {body}"
            )));
        }
        Ok(response.json().await?)
    }
}
