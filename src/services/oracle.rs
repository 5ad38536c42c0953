//! Client for the external email verification oracle.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Outcome of a single verification call. Closed set: anything the oracle
/// returns outside the known statuses maps to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    Invalid,
    Catchall,
    Error,
}

/// Result of one oracle call, including mail-exchanger metadata when the
/// oracle reports it.
#[derive(Debug, Clone)]
pub struct Verification {
    pub outcome: VerifyOutcome,
    pub mx_host: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("HTTP request to verification oracle failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("oracle returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait VerifyOracle: Send + Sync {
    async fn verify(&self, email: &str, credential: &str) -> Result<Verification, OracleError>;
}

#[derive(Deserialize)]
struct OracleResponse {
    status: String,
    #[serde(default)]
    mx_host: Option<String>,
}

/// HTTP client for the verification oracle API.
pub struct EmailOracleClient {
    http: Client,
    base_url: String,
}

impl EmailOracleClient {
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VerifyOracle for EmailOracleClient {
    async fn verify(&self, email: &str, credential: &str) -> Result<Verification, OracleError> {
        let url = format!("{}/v1/verify", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("email", email), ("key", credential)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OracleError::Status(response.status().as_u16()));
        }

        let body: OracleResponse = response.json().await?;
        let outcome = match body.status.as_str() {
            "valid" => VerifyOutcome::Valid,
            "invalid" => VerifyOutcome::Invalid,
            "catchall" | "catch_all" => VerifyOutcome::Catchall,
            "error" => VerifyOutcome::Error,
            other => {
                tracing::warn!(status = other, email, "unrecognized oracle status");
                VerifyOutcome::Error
            }
        };

        Ok(Verification {
            outcome,
            mx_host: body.mx_host,
        })
    }
}
