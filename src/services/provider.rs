//! Client for the external lead-scraping provider.
//!
//! The provider is single-tenant: it cannot run two scrape sessions at once,
//! which is why the queue coordinator serializes orders before anything here
//! is called. Responses are parsed into closed enums; an unknown run state is
//! an explicit error, never a free-form value threaded downstream.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::order::ExportFormat;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("scraping session credential was rejected")]
    CredentialRejected,

    #[error("export requested before the provider finished preparing the artifact")]
    NotReady,

    #[error("HTTP request to scraping provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

/// Run state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeRunState {
    Running,
    Finished,
    Failed,
}

/// One status poll result.
#[derive(Debug, Clone)]
pub struct ScrapeStatus {
    pub state: ScrapeRunState,
    pub progress: i32,
    pub leads_found: i32,
    pub leads_qualified: i32,
}

#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    /// Push the session credential and submit a scrape request. Returns the
    /// provider's order reference. Called at most once per order.
    async fn submit(
        &self,
        session: &str,
        target_url: &str,
        qualified_only: bool,
    ) -> Result<String, ProviderError>;

    async fn status(&self, external_ref: &str) -> Result<ScrapeStatus, ProviderError>;

    /// Idempotent check: the artifact URL if the export already completed.
    /// Safe to call repeatedly before re-issuing an export.
    async fn artifact_ready(
        &self,
        external_ref: &str,
        format: ExportFormat,
    ) -> Result<Option<String>, ProviderError>;

    /// Trigger artifact export. May return [`ProviderError::NotReady`] if the
    /// provider has not finished preparing results.
    async fn export(
        &self,
        external_ref: &str,
        format: ExportFormat,
    ) -> Result<String, ProviderError>;

    async fn download(&self, artifact_url: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    order_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: i32,
    #[serde(default)]
    leads_found: i32,
    #[serde(default)]
    leads_qualified: i32,
}

#[derive(Deserialize)]
struct ExportResponse {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    url: Option<String>,
}

/// HTTP client for the scraping provider API.
pub struct LeadScraperClient {
    http: Client,
    base_url: String,
}

impl LeadScraperClient {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn parse_state(status: &str) -> Result<ScrapeRunState, ProviderError> {
        match status {
            "queued" | "starting" | "running" => Ok(ScrapeRunState::Running),
            "finished" | "completed" => Ok(ScrapeRunState::Finished),
            "failed" | "error" => Ok(ScrapeRunState::Failed),
            other => Err(ProviderError::Unexpected(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl ScrapeProvider for LeadScraperClient {
    async fn submit(
        &self,
        session: &str,
        target_url: &str,
        qualified_only: bool,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/orders", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(session)
            .json(&serde_json::json!({
                "target_url": target_url,
                "qualified_only": qualified_only,
            }))
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => return Err(ProviderError::CredentialRejected),
            code if !(200..300).contains(&code) => {
                return Err(ProviderError::Unexpected(format!(
                    "submit returned HTTP {code}"
                )));
            }
            _ => {}
        }

        let body: SubmitResponse = response.json().await?;
        Ok(body.order_id)
    }

    async fn status(&self, external_ref: &str) -> Result<ScrapeStatus, ProviderError> {
        let url = format!("{}/api/orders/{}", self.base_url, external_ref);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unexpected(format!(
                "status returned HTTP {}",
                response.status()
            )));
        }
        let body: StatusResponse = response.json().await?;
        Ok(ScrapeStatus {
            state: Self::parse_state(&body.status)?,
            progress: body.progress,
            leads_found: body.leads_found,
            leads_qualified: body.leads_qualified,
        })
    }

    async fn artifact_ready(
        &self,
        external_ref: &str,
        format: ExportFormat,
    ) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/api/orders/{}/export?format={}",
            self.base_url, external_ref, format
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unexpected(format!(
                "export check returned HTTP {}",
                response.status()
            )));
        }
        let body: ExportResponse = response.json().await?;
        Ok(if body.ready { body.url } else { None })
    }

    async fn export(
        &self,
        external_ref: &str,
        format: ExportFormat,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/api/orders/{}/export?format={}",
            self.base_url, external_ref, format
        );
        let response = self.http.post(&url).send().await?;
        match response.status().as_u16() {
            409 | 425 => return Err(ProviderError::NotReady),
            code if !(200..300).contains(&code) => {
                return Err(ProviderError::Unexpected(format!(
                    "export returned HTTP {code}"
                )));
            }
            _ => {}
        }
        let body: ExportResponse = response.json().await?;
        body.url
            .ok_or_else(|| ProviderError::Unexpected("export response missing url".to_string()))
    }

    async fn download(&self, artifact_url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.http.get(artifact_url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unexpected(format!(
                "download returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_known_values() {
        assert_eq!(
            LeadScraperClient::parse_state("running").unwrap(),
            ScrapeRunState::Running
        );
        assert_eq!(
            LeadScraperClient::parse_state("finished").unwrap(),
            ScrapeRunState::Finished
        );
        assert_eq!(
            LeadScraperClient::parse_state("failed").unwrap(),
            ScrapeRunState::Failed
        );
    }

    #[test]
    fn test_parse_state_unknown_is_error() {
        assert!(LeadScraperClient::parse_state("paused").is_err());
    }
}
