//! Shared doubles for the pipeline tests: scripted provider and oracle
//! implementations with just enough behavior to exercise the order state
//! machine and the enrichment pipeline end to end.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use lead_enrich::models::order::ExportFormat;
use lead_enrich::services::oracle::{OracleError, Verification, VerifyOracle, VerifyOutcome};
use lead_enrich::services::provider::{
    ProviderError, ScrapeProvider, ScrapeRunState, ScrapeStatus,
};

/// Scripted scraping provider.
///
/// Reports `running` for a fixed number of polls before finishing, and makes
/// the artifact available only from the configured export attempt onward.
/// Counts submissions so tests can assert single flight.
pub struct ScriptedProvider {
    pub artifact_bytes: Vec<u8>,
    pub polls_until_finished: u32,
    pub export_ready_on_attempt: u32,
    pub submissions: AtomicU32,
    polls: AtomicU32,
    export_attempts: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(artifact_bytes: Vec<u8>, polls_until_finished: u32, export_ready_on_attempt: u32) -> Self {
        Self {
            artifact_bytes,
            polls_until_finished,
            export_ready_on_attempt,
            submissions: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            export_attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ScrapeProvider for ScriptedProvider {
    async fn submit(&self, _: &str, _: &str, _: bool) -> Result<String, ProviderError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("scripted-{n}"))
    }

    async fn status(&self, _: &str) -> Result<ScrapeStatus, ProviderError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll + 1 >= self.polls_until_finished {
            Ok(ScrapeStatus {
                state: ScrapeRunState::Finished,
                progress: 100,
                leads_found: 2,
                leads_qualified: 1,
            })
        } else {
            Ok(ScrapeStatus {
                state: ScrapeRunState::Running,
                progress: ((poll + 1) * 100 / self.polls_until_finished) as i32,
                leads_found: 0,
                leads_qualified: 0,
            })
        }
    }

    async fn artifact_ready(
        &self,
        external_ref: &str,
        _: ExportFormat,
    ) -> Result<Option<String>, ProviderError> {
        let attempt = self.export_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.export_ready_on_attempt {
            Ok(Some(format!("https://provider.test/{external_ref}.csv")))
        } else {
            Ok(None)
        }
    }

    async fn export(&self, _: &str, _: ExportFormat) -> Result<String, ProviderError> {
        Err(ProviderError::NotReady)
    }

    async fn download(&self, _: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(self.artifact_bytes.clone())
    }
}

/// Oracle that validates a fixed set of addresses, marks everything else
/// invalid, and counts calls.
pub struct ScriptedOracle {
    pub valid_emails: Vec<String>,
    pub calls: AtomicU32,
}

impl ScriptedOracle {
    pub fn validating(valid_emails: &[&str]) -> Self {
        Self {
            valid_emails: valid_emails.iter().map(|s| s.to_string()).collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl VerifyOracle for ScriptedOracle {
    async fn verify(&self, email: &str, _: &str) -> Result<Verification, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if self.valid_emails.iter().any(|v| v == email) {
            VerifyOutcome::Valid
        } else {
            VerifyOutcome::Invalid
        };
        Ok(Verification {
            outcome,
            mx_host: Some("mx.test".to_string()),
        })
    }
}
