//! In-memory store implementations.
//!
//! Used by the unit and pipeline tests to exercise the coordinator, state
//! machine, and enrichment pipeline without a database. Behavior mirrors the
//! PostgreSQL implementations, including the conditional transitions.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::store::{JobStore, LeadStore, OrderStore, StoreError};
use crate::models::job::{EnrichmentJob, JobStatus};
use crate::models::lead::Lead;
use crate::models::order::{OrderStatus, ScrapeOrder};

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<ScrapeOrder>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for test assertions.
    pub async fn all(&self) -> Vec<ScrapeOrder> {
        self.orders.lock().await.clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &ScrapeOrder) -> Result<(), StoreError> {
        self.orders.lock().await.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScrapeOrder>, StoreError> {
        Ok(self.orders.lock().await.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<ScrapeOrder>, StoreError> {
        Ok(self
            .orders
            .lock()
            .await
            .iter()
            .find(|o| o.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn active_order(&self) -> Result<Option<ScrapeOrder>, StoreError> {
        Ok(self
            .orders
            .lock()
            .await
            .iter()
            .find(|o| o.status == OrderStatus::Processing && o.external_ref.is_some())
            .cloned())
    }

    async fn oldest_queued(&self) -> Result<Option<ScrapeOrder>, StoreError> {
        let orders = self.orders.lock().await;
        Ok(orders
            .iter()
            .filter(|o| o.status == OrderStatus::Queued)
            .min_by_key(|o| o.created_at)
            .cloned())
    }

    async fn mark_processing(&self, id: Uuid, external_ref: &str) -> Result<bool, StoreError> {
        let mut orders = self.orders.lock().await;
        match orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Queued && o.external_ref.is_none())
        {
            Some(order) => {
                order.status = OrderStatus::Processing;
                order.external_ref = Some(external_ref.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_progress(
        &self,
        id: Uuid,
        progress: i32,
        leads_found: i32,
        leads_qualified: i32,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Processing)
        {
            order.progress = progress;
            order.leads_found = leads_found;
            order.leads_qualified = leads_qualified;
        }
        Ok(())
    }

    async fn update_counts(
        &self,
        id: Uuid,
        leads_found: i32,
        leads_qualified: i32,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders
            .iter_mut()
            .find(|o| o.id == id && o.status != OrderStatus::Failed)
        {
            order.leads_found = leads_found;
            order.leads_qualified = leads_qualified;
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, artifact_url: &str) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Processing)
        {
            order.status = OrderStatus::Completed;
            order.artifact_url = Some(artifact_url.to_string());
            order.progress = 100;
            order.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders
            .iter_mut()
            .find(|o| o.id == id && !o.status.is_terminal())
        {
            order.status = OrderStatus::Failed;
            order.failure_reason = Some(reason.to_string());
            order.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<EnrichmentJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<EnrichmentJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &EnrichmentJob) -> Result<(), StoreError> {
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EnrichmentJob>, StoreError> {
        Ok(self.jobs.lock().await.iter().find(|j| j.id == id).cloned())
    }

    async fn find_by_artifact(
        &self,
        owner_id: Uuid,
        artifact_ref: &str,
    ) -> Result<Option<EnrichmentJob>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| j.owner_id == owner_id && j.artifact_ref.as_deref() == Some(artifact_ref))
            .cloned())
    }

    async fn find_placeholder_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<EnrichmentJob>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| {
                j.source_order_id == Some(order_id) && j.status == JobStatus::WaitingForArtifact
            })
            .cloned())
    }

    async fn attach_artifact(&self, id: Uuid, artifact_ref: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::WaitingForArtifact)
        {
            job.artifact_ref = Some(artifact_ref.to_string());
            job.status = JobStatus::Pending;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| {
            j.id == id && j.status == JobStatus::Pending && j.artifact_ref.is_some()
        }) {
            Some(job) => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        total_rows: i32,
        processed_rows: i32,
        valid_count: i32,
        catchall_count: i32,
        cost: i64,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            job.status = JobStatus::Completed;
            job.total_rows = total_rows;
            job.processed_rows = processed_rows;
            job.valid_count = valid_count;
            job.catchall_count = catchall_count;
            job.cost = cost;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| {
            j.id == id && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
        }) {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<Vec<Lead>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Lead> {
        self.leads.lock().await.clone()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn insert(&self, lead: &Lead) -> Result<(), StoreError> {
        self.leads.lock().await.push(lead.clone());
        Ok(())
    }

    async fn insert_many(&self, leads: &[Lead]) -> Result<(), StoreError> {
        self.leads.lock().await.extend(leads.iter().cloned());
        Ok(())
    }

    async fn leads_for_job(&self, job_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        Ok(self
            .leads
            .lock()
            .await
            .iter()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn set_final(&self, lead_id: Uuid) -> Result<(), StoreError> {
        let mut leads = self.leads.lock().await;
        if let Some(lead) = leads.iter_mut().find(|l| l.id == lead_id) {
            lead.is_final_result = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::ExportFormat;

    fn order() -> ScrapeOrder {
        ScrapeOrder::new(
            Uuid::new_v4(),
            "https://example.com/people".to_string(),
            ExportFormat::Csv,
            false,
        )
    }

    #[tokio::test]
    async fn test_count_backfill_applies_to_completed_but_not_failed_orders() {
        let store = MemoryOrderStore::new();

        let done = order();
        store.insert(&done).await.unwrap();
        assert!(store.mark_processing(done.id, "ext-1").await.unwrap());
        store.mark_completed(done.id, "orders/x/leads.csv").await.unwrap();

        let dead = order();
        store.insert(&dead).await.unwrap();
        store.mark_failed(dead.id, "timeout").await.unwrap();

        store.update_counts(done.id, 25, 10).await.unwrap();
        store.update_counts(dead.id, 25, 10).await.unwrap();

        let done = store.get(done.id).await.unwrap().unwrap();
        assert_eq!(done.leads_found, 25);
        assert_eq!(done.leads_qualified, 10);

        let dead = store.get(dead.id).await.unwrap().unwrap();
        assert_eq!(dead.status, OrderStatus::Failed);
        assert_eq!(dead.leads_found, 0);
        assert_eq!(dead.leads_qualified, 0);
    }
}
