//! Queue coordinator.
//!
//! Exactly one scrape order runs against the provider at a time. The
//! single-flight guarantee is derived from persisted state alone: an order in
//! `processing` with a non-empty external reference IS the active slot, so a
//! restarted coordinator resumes whatever it finds there before pulling new
//! work from the queue.

use std::time::Duration;

use crate::db::store::{OrderStore, StoreError};
use crate::services::provider::ScrapeProvider;
use crate::services::storage::ArtifactStore;
use crate::workers::order_machine::{OrderMachine, OrderMachineConfig};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Sleep between ticks when no order is queued or active.
    pub idle_poll: Duration,
    pub machine: OrderMachineConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_secs(10),
            machine: OrderMachineConfig::default(),
        }
    }
}

/// Outcome of one coordinator tick, mostly for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Resumed an order already in flight.
    Resumed,
    /// Pulled a queued order and drove it.
    Started,
    /// Nothing to do.
    Idle,
}

pub struct QueueCoordinator<'a> {
    provider: &'a dyn ScrapeProvider,
    store: &'a dyn OrderStore,
    artifacts: &'a dyn ArtifactStore,
    session: &'a str,
    cfg: CoordinatorConfig,
}

impl<'a> QueueCoordinator<'a> {
    pub fn new(
        provider: &'a dyn ScrapeProvider,
        store: &'a dyn OrderStore,
        artifacts: &'a dyn ArtifactStore,
        session: &'a str,
        cfg: CoordinatorConfig,
    ) -> Self {
        Self {
            provider,
            store,
            artifacts,
            session,
            cfg,
        }
    }

    fn machine(&self) -> OrderMachine<'a> {
        OrderMachine::new(
            self.provider,
            self.store,
            self.artifacts,
            self.session,
            self.cfg.machine.clone(),
        )
    }

    /// One scheduling decision. Drives the chosen order to a terminal state
    /// before returning, so no second order can be submitted concurrently.
    pub async fn tick(&self) -> Result<Tick, StoreError> {
        if let Some(active) = self.store.active_order().await? {
            let external_ref = active
                .external_ref
                .clone()
                .unwrap_or_default();
            tracing::info!(order_id = %active.id, %external_ref, "resuming in-flight order");
            self.machine().run(active.id, &external_ref).await?;
            return Ok(Tick::Resumed);
        }

        match self.store.oldest_queued().await? {
            Some(order) => {
                metrics::gauge!("coordinator_active_orders").set(1.0);
                let machine = self.machine();
                if let Some(external_ref) = machine.submit(&order).await? {
                    machine.run(order.id, &external_ref).await?;
                }
                metrics::gauge!("coordinator_active_orders").set(0.0);
                Ok(Tick::Started)
            }
            None => Ok(Tick::Idle),
        }
    }

    /// Coordinator loop. Errors from a tick are logged and the loop keeps
    /// going; a transient database outage must not kill the scheduler.
    pub async fn run_forever(&self) {
        loop {
            match self.tick().await {
                Ok(Tick::Idle) => {
                    tokio::time::sleep(self.cfg.idle_poll).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "coordinator tick failed");
                    tokio::time::sleep(self.cfg.idle_poll).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryOrderStore;
    use crate::models::order::{ExportFormat, OrderStatus, ScrapeOrder};
    use crate::services::provider::{ProviderError, ScrapeRunState, ScrapeStatus};
    use crate::services::storage::MemoryArtifactStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn fast_cfg() -> CoordinatorConfig {
        CoordinatorConfig {
            idle_poll: Duration::from_millis(1),
            machine: OrderMachineConfig {
                poll_interval: Duration::from_millis(1),
                max_wait: Duration::from_millis(250),
                export_base_delay: Duration::from_millis(1),
                export_backoff: 2.0,
                export_max_attempts: 3,
            },
        }
    }

    /// Finishes any order on the first status poll; counts submissions.
    struct InstantProvider {
        submissions: AtomicU32,
    }

    impl InstantProvider {
        fn new() -> Self {
            Self {
                submissions: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ScrapeProvider for InstantProvider {
        async fn submit(&self, _: &str, _: &str, _: bool) -> Result<String, ProviderError> {
            let n = self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(format!("ext-{n}"))
        }
        async fn status(&self, _: &str) -> Result<ScrapeStatus, ProviderError> {
            Ok(ScrapeStatus {
                state: ScrapeRunState::Finished,
                progress: 100,
                leads_found: 5,
                leads_qualified: 2,
            })
        }
        async fn artifact_ready(
            &self,
            _: &str,
            _: ExportFormat,
        ) -> Result<Option<String>, ProviderError> {
            Ok(Some("https://provider.test/a".to_string()))
        }
        async fn export(&self, _: &str, _: ExportFormat) -> Result<String, ProviderError> {
            Ok("https://provider.test/a".to_string())
        }
        async fn download(&self, _: &str) -> Result<Vec<u8>, ProviderError> {
            Ok(b"first_name,last_name,company,domain\n".to_vec())
        }
    }

    fn queued(target: &str) -> ScrapeOrder {
        ScrapeOrder::new(
            Uuid::new_v4(),
            target.to_string(),
            ExportFormat::Csv,
            false,
        )
    }

    #[tokio::test]
    async fn test_idle_when_nothing_queued() {
        let store = MemoryOrderStore::new();
        let artifacts = MemoryArtifactStore::new();
        let provider = InstantProvider::new();
        let coord = QueueCoordinator::new(&provider, &store, &artifacts, "s", fast_cfg());

        assert_eq!(coord.tick().await.unwrap(), Tick::Idle);
        assert_eq!(provider.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_orders_run_fifo_one_at_a_time() {
        let store = MemoryOrderStore::new();
        let artifacts = MemoryArtifactStore::new();
        let provider = InstantProvider::new();
        let coord = QueueCoordinator::new(&provider, &store, &artifacts, "s", fast_cfg());

        let first = queued("https://example.com/a");
        // Force distinct created_at ordering.
        let mut second = queued("https://example.com/b");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        assert_eq!(coord.tick().await.unwrap(), Tick::Started);
        let a = store.get(first.id).await.unwrap().unwrap();
        let b = store.get(second.id).await.unwrap().unwrap();
        assert_eq!(a.status, OrderStatus::Completed);
        assert_eq!(b.status, OrderStatus::Queued);

        assert_eq!(coord.tick().await.unwrap(), Tick::Started);
        let b = store.get(second.id).await.unwrap().unwrap();
        assert_eq!(b.status, OrderStatus::Completed);
        assert_eq!(provider.submissions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_restart_resumes_in_flight_order_without_resubmitting() {
        let store = MemoryOrderStore::new();
        let artifacts = MemoryArtifactStore::new();
        let provider = InstantProvider::new();
        let coord = QueueCoordinator::new(&provider, &store, &artifacts, "s", fast_cfg());

        // An order left in processing by a previous process.
        let order = queued("https://example.com/a");
        store.insert(&order).await.unwrap();
        assert!(store.mark_processing(order.id, "ext-prior").await.unwrap());

        // A newer queued order must wait behind it.
        let waiting = queued("https://example.com/b");
        store.insert(&waiting).await.unwrap();

        assert_eq!(coord.tick().await.unwrap(), Tick::Resumed);
        assert_eq!(provider.submissions.load(Ordering::SeqCst), 0);

        let resumed = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(resumed.status, OrderStatus::Completed);
        assert_eq!(resumed.external_ref.as_deref(), Some("ext-prior"));

        let still_queued = store.get(waiting.id).await.unwrap().unwrap();
        assert_eq!(still_queued.status, OrderStatus::Queued);
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrent_ticks() {
        // Two coordinators polled concurrently over the same store. Whatever
        // the interleaving, the conditional queued → processing transition
        // lets exactly one tick record a submission for the order; the other
        // either resumes the winner's run or backs off without driving.
        let store = MemoryOrderStore::new();
        let artifacts = MemoryArtifactStore::new();
        let provider = InstantProvider::new();
        let a = QueueCoordinator::new(&provider, &store, &artifacts, "s", fast_cfg());
        let b = QueueCoordinator::new(&provider, &store, &artifacts, "s", fast_cfg());

        let order = queued("https://example.com/a");
        store.insert(&order).await.unwrap();

        for outcome in futures::future::join_all([a.tick(), b.tick()]).await {
            outcome.unwrap();
        }

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        let recorded = stored.external_ref.clone().unwrap();
        assert!(recorded.starts_with("ext-"));

        // The recorded reference is immutable from here on; a late claim
        // attempt is rejected and changes nothing.
        assert!(!store.mark_processing(order.id, "ext-late").await.unwrap());
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.external_ref.as_deref(), Some(recorded.as_str()));

        assert_eq!(a.tick().await.unwrap(), Tick::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_record_exactly_one_external_ref() {
        let store = MemoryOrderStore::new();
        let order = queued("https://example.com/a");
        store.insert(&order).await.unwrap();

        let results = futures::future::join_all([
            store.mark_processing(order.id, "ext-a"),
            store.mark_processing(order.id, "ext-b"),
        ])
        .await;
        let wins: Vec<bool> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(wins.iter().filter(|w| **w).count(), 1);

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        let recorded = stored.external_ref.as_deref().unwrap();
        assert!(recorded == "ext-a" || recorded == "ext-b");
    }
}
