//! Order state machine.
//!
//! Drives one scrape order through queued → processing → {completed, failed}.
//! All durable state lives on the ScrapeOrder record, so a restarted process
//! can resume any order it finds in `processing`. Submission is attempted
//! exactly once per order; re-submitting could create a duplicate external
//! order. Export retries are bounded with exponential backoff and re-check
//! artifact availability before re-issuing the export call.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::db::store::{OrderStore, StoreError};
use crate::models::order::ScrapeOrder;
use crate::services::provider::{ProviderError, ScrapeProvider, ScrapeRunState};
use crate::services::storage::ArtifactStore;

#[derive(Debug, Clone)]
pub struct OrderMachineConfig {
    /// Interval between provider status polls.
    pub poll_interval: Duration,
    /// Upper bound on the total time an order may spend in `processing`.
    pub max_wait: Duration,
    /// First export retry delay; multiplied by `export_backoff` per attempt.
    pub export_base_delay: Duration,
    pub export_backoff: f64,
    pub export_max_attempts: u32,
}

impl Default for OrderMachineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            max_wait: Duration::from_secs(3600),
            export_base_delay: Duration::from_secs(2),
            export_backoff: 2.0,
            export_max_attempts: 5,
        }
    }
}

pub struct OrderMachine<'a> {
    provider: &'a dyn ScrapeProvider,
    store: &'a dyn OrderStore,
    artifacts: &'a dyn ArtifactStore,
    session: &'a str,
    cfg: OrderMachineConfig,
}

impl<'a> OrderMachine<'a> {
    pub fn new(
        provider: &'a dyn ScrapeProvider,
        store: &'a dyn OrderStore,
        artifacts: &'a dyn ArtifactStore,
        session: &'a str,
        cfg: OrderMachineConfig,
    ) -> Self {
        Self {
            provider,
            store,
            artifacts,
            session,
            cfg,
        }
    }

    /// queued → processing. Pushes the session credential and submits the
    /// scrape request; any submission error is terminal for the order.
    /// Returns the external reference on success.
    pub async fn submit(&self, order: &ScrapeOrder) -> Result<Option<String>, StoreError> {
        tracing::info!(order_id = %order.id, target_url = %order.target_url, "submitting scrape order");

        match self
            .provider
            .submit(self.session, &order.target_url, order.qualified_only)
            .await
        {
            Ok(external_ref) => {
                if self.store.mark_processing(order.id, &external_ref).await? {
                    metrics::counter!("scrape_orders_submitted").increment(1);
                    tracing::info!(order_id = %order.id, external_ref, "order submitted");
                    Ok(Some(external_ref))
                } else {
                    // Someone else already moved this order; do not drive it.
                    tracing::warn!(order_id = %order.id, "order left queued state before submission was recorded");
                    Ok(None)
                }
            }
            Err(ProviderError::CredentialRejected) => {
                tracing::error!(order_id = %order.id, "scraping session credential rejected");
                self.store.mark_failed(order.id, "credential rejected").await?;
                Ok(None)
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "order submission failed");
                self.store
                    .mark_failed(order.id, &format!("submission failed: {e}"))
                    .await?;
                Ok(None)
            }
        }
    }

    /// processing → {completed, failed}. Polls provider status, updating
    /// progress counters on every poll; poll errors are logged and the loop
    /// continues. The total wait is bounded by `max_wait`.
    pub async fn run(&self, order_id: Uuid, external_ref: &str) -> Result<(), StoreError> {
        let started = Instant::now();

        loop {
            if started.elapsed() >= self.cfg.max_wait {
                tracing::error!(order_id = %order_id, "order exceeded maximum wait");
                self.store.mark_failed(order_id, "timeout").await?;
                return Ok(());
            }

            match self.provider.status(external_ref).await {
                Ok(status) => {
                    self.store
                        .update_progress(
                            order_id,
                            status.progress,
                            status.leads_found,
                            status.leads_qualified,
                        )
                        .await?;

                    match status.state {
                        ScrapeRunState::Running => {}
                        ScrapeRunState::Finished => {
                            return self.export_and_store(order_id, external_ref).await;
                        }
                        ScrapeRunState::Failed => {
                            tracing::error!(order_id = %order_id, "provider reported scrape failure");
                            self.store
                                .mark_failed(order_id, "provider reported failure")
                                .await?;
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "status poll failed, will retry");
                }
            }

            sleep(self.cfg.poll_interval).await;
        }
    }

    /// Export, download, and persist the artifact, then mark completed.
    /// Each retry first re-checks whether the artifact already became
    /// available, so a duplicate export call is never issued for an artifact
    /// the provider has finished preparing.
    async fn export_and_store(&self, order_id: Uuid, external_ref: &str) -> Result<(), StoreError> {
        let order = match self.store.get(order_id).await? {
            Some(order) => order,
            None => {
                tracing::error!(order_id = %order_id, "order disappeared during export");
                return Ok(());
            }
        };
        let format = order.export_format;

        let mut delay = self.cfg.export_base_delay;
        for attempt in 0..self.cfg.export_max_attempts {
            if attempt > 0 {
                sleep(delay).await;
                delay = delay.mul_f64(self.cfg.export_backoff);
            }

            let artifact_url = match self.provider.artifact_ready(external_ref, format).await {
                Ok(Some(url)) => Some(url),
                Ok(None) => match self.provider.export(external_ref, format).await {
                    Ok(url) => Some(url),
                    Err(ProviderError::NotReady) => {
                        tracing::debug!(order_id = %order_id, attempt, "artifact not ready yet");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(order_id = %order_id, attempt, error = %e, "export call failed");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(order_id = %order_id, attempt, error = %e, "artifact readiness check failed");
                    None
                }
            };

            let artifact_url = match artifact_url {
                Some(url) => url,
                None => continue,
            };

            match self.provider.download(&artifact_url).await {
                Ok(bytes) => {
                    let key = order.artifact_key();
                    match self
                        .artifacts
                        .put(&key, &bytes, format.content_type())
                        .await
                    {
                        Ok(()) => {
                            self.store.mark_completed(order_id, &key).await?;
                            metrics::counter!("scrape_orders_completed").increment(1);
                            tracing::info!(order_id = %order_id, artifact = %key, "order completed");
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::warn!(order_id = %order_id, attempt, error = %e, "artifact upload failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, attempt, error = %e, "artifact download failed");
                }
            }
        }

        tracing::error!(
            order_id = %order_id,
            attempts = self.cfg.export_max_attempts,
            "export exhausted retries"
        );
        self.store
            .mark_failed(
                order_id,
                &format!(
                    "export failed after {} attempts",
                    self.cfg.export_max_attempts
                ),
            )
            .await?;
        metrics::counter!("scrape_orders_failed").increment(1);
        Ok(())
    }
}
