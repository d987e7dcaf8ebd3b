//! HTTP adapters for the metadata and summary stores.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{MetadataStore, ProjectRecord, RecordUpdate, SampleRecord, SummaryStore};
use crate::config::{MetadataStoreConfig, SummaryStoreConfig};
use crate::error::{DeliveryError, DeliveryResult};

const API_TOKEN_HEADER: &str = "X-API-Token";

fn build_client(timeout_secs: u64) -> DeliveryResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DeliveryError::ConfigurationError(format!("Failed to build HTTP client: {e}")))
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> DeliveryResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(DeliveryError::DatabaseError(format!(
            "{what} returned status {status}: {body}"
        )));
    }
    response.json::<T>().await.map_err(|e| {
        DeliveryError::DatabaseError(format!("Failed to parse {what} response: {e}"))
    })
}

async fn expect_success(response: Response, what: &str) -> DeliveryResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(DeliveryError::DatabaseError(format!(
        "{what} returned status {status}: {body}"
    )))
}

/// REST client for the project/sample metadata store
#[derive(Debug, Clone)]
pub struct HttpMetadataStore {
    client: Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct SampleListing {
    samples: Option<Vec<SampleRecord>>,
}

impl HttpMetadataStore {
    pub fn new(config: &MetadataStoreConfig) -> DeliveryResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> DeliveryResult<T> {
        let url = self.url(path);
        debug!(url = %url, "Reading metadata record");
        let response = self
            .client
            .get(&url)
            .header(API_TOKEN_HEADER, &self.api_token)
            .send()
            .await
            .map_err(|e| DeliveryError::DatabaseError(format!("Failed to send request: {e}")))?;
        read_json(response, &url).await
    }

    async fn put(&self, path: &str, update: &RecordUpdate) -> DeliveryResult<()> {
        let url = self.url(path);
        debug!(url = %url, update = ?update, "Updating metadata record");
        let response = self
            .client
            .put(&url)
            .header(API_TOKEN_HEADER, &self.api_token)
            .json(update)
            .send()
            .await
            .map_err(|e| DeliveryError::DatabaseError(format!("Failed to send request: {e}")))?;
        expect_success(response, &url).await
    }
}

#[async_trait]
impl MetadataStore for HttpMetadataStore {
    async fn project(&self, project_id: &str) -> DeliveryResult<ProjectRecord> {
        self.get(&format!("project/{project_id}")).await
    }

    async fn project_samples(&self, project_id: &str) -> DeliveryResult<Vec<SampleRecord>> {
        let listing: SampleListing = self.get(&format!("samples/{project_id}")).await?;
        listing.samples.ok_or_else(|| {
            DeliveryError::DatabaseError(format!(
                "Metadata store returned no sample listing for project {project_id}"
            ))
        })
    }

    async fn sample(&self, project_id: &str, sample_id: &str) -> DeliveryResult<SampleRecord> {
        self.get(&format!("sample/{project_id}/{sample_id}")).await
    }

    async fn update_project(&self, project_id: &str, update: &RecordUpdate) -> DeliveryResult<()> {
        self.put(&format!("project/{project_id}"), update).await
    }

    async fn update_sample(
        &self,
        project_id: &str,
        sample_id: &str,
        update: &RecordUpdate,
    ) -> DeliveryResult<()> {
        self.put(&format!("sample/{project_id}/{sample_id}"), update)
            .await
    }
}

/// Document-store client for project summary documents
#[derive(Debug, Clone)]
pub struct HttpSummaryStore {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ViewResult {
    rows: Vec<ViewRow>,
}

#[derive(Debug, Deserialize)]
struct ViewRow {
    value: Value,
}

impl HttpSummaryStore {
    pub fn new(config: &SummaryStoreConfig) -> DeliveryResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Look up the single value a view holds for `key`
    async fn single_view_value(&self, view: &str, key: &str) -> DeliveryResult<Value> {
        let url = format!("{}/projects/_design/{view}", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("key", serde_json::to_string(key)?)])
            .send()
            .await?;
        let result: ViewResult = read_json(response, &url).await?;
        match result.rows.len() {
            0 => Err(DeliveryError::DatabaseError(format!(
                "Project {key} not found in summary store view {view}"
            ))),
            1 => Ok(result.rows.into_iter().next().map(|r| r.value).unwrap_or(Value::Null)),
            n => Err(DeliveryError::DatabaseError(format!(
                "Project {key} has {n} entries in summary store view {view}"
            ))),
        }
    }

    fn value_as_string(value: Value, what: &str) -> DeliveryResult<String> {
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(DeliveryError::DatabaseError(format!(
                "Unexpected {what} in summary store: {other}"
            ))),
        }
    }
}

#[async_trait]
impl SummaryStore for HttpSummaryStore {
    async fn append_delivery_project(
        &self,
        project_id: &str,
        delivery_project: &str,
    ) -> DeliveryResult<()> {
        let doc_id = Self::value_as_string(
            self.single_view_value("project/_view/project_id", project_id)
                .await?,
            "document id",
        )?;
        let url = format!("{}/projects/{doc_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let mut document: Value = read_json(response, &url).await?;

        let object = document.as_object_mut().ok_or_else(|| {
            DeliveryError::DatabaseError(format!("Summary document {doc_id} is not an object"))
        })?;
        let projects = object
            .entry("delivery_projects")
            .or_insert_with(|| Value::Array(Vec::new()));
        match projects {
            Value::Array(list) => list.push(Value::String(delivery_project.to_string())),
            other => *other = Value::Array(vec![Value::String(delivery_project.to_string())]),
        }

        let response = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&document)
            .send()
            .await?;
        expect_success(response, &url).await?;
        info!(
            project_id = %project_id,
            delivery_project = %delivery_project,
            "Summary store delivery_projects updated"
        );
        Ok(())
    }

    async fn order_portal_id(&self, project_id: &str) -> DeliveryResult<String> {
        let value = self
            .single_view_value("order_portal/_view/ProjectID_to_PortalID", project_id)
            .await?;
        Self::value_as_string(value, "order portal id")
    }
}
