//! Store traits for the durable records.
//!
//! The relational record is the source of truth for every worker loop; the
//! dispatch queue only wakes workers. Traits keep the order/queue invariants
//! testable with the in-memory implementations in [`crate::db::memory`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::EnrichmentJob;
use crate::models::lead::Lead;
use crate::models::order::ScrapeOrder;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to decode stored value: {0}")]
    Decode(String),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &ScrapeOrder) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ScrapeOrder>, StoreError>;

    async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<ScrapeOrder>, StoreError>;

    /// The order currently holding the provider session: status `processing`
    /// with a non-empty external reference. The single-flight invariant is
    /// derived from this query, never from in-memory flags.
    async fn active_order(&self) -> Result<Option<ScrapeOrder>, StoreError>;

    /// Oldest order still in `queued` (FIFO by creation time).
    async fn oldest_queued(&self) -> Result<Option<ScrapeOrder>, StoreError>;

    /// Atomically transition queued → processing and assign the external
    /// reference. Returns false if the order already left `queued`.
    async fn mark_processing(&self, id: Uuid, external_ref: &str) -> Result<bool, StoreError>;

    async fn update_progress(
        &self,
        id: Uuid,
        progress: i32,
        leads_found: i32,
        leads_qualified: i32,
    ) -> Result<(), StoreError>;

    /// Backfill result counts reported out-of-band (webhook) without touching
    /// progress or status. Completed orders accept the backfill, since the
    /// webhook usually lands after the artifact is stored; failed orders are
    /// never mutated.
    async fn update_counts(
        &self,
        id: Uuid,
        leads_found: i32,
        leads_qualified: i32,
    ) -> Result<(), StoreError>;

    async fn mark_completed(&self, id: Uuid, artifact_url: &str) -> Result<(), StoreError>;

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &EnrichmentJob) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<EnrichmentJob>, StoreError>;

    /// Idempotency lookup: the job (if any) already bound to this artifact
    /// for this owner.
    async fn find_by_artifact(
        &self,
        owner_id: Uuid,
        artifact_ref: &str,
    ) -> Result<Option<EnrichmentJob>, StoreError>;

    /// The placeholder job created when the given order was accepted, still
    /// waiting for its artifact.
    async fn find_placeholder_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<EnrichmentJob>, StoreError>;

    /// Set the artifact reference and move waiting_for_artifact → pending.
    async fn attach_artifact(&self, id: Uuid, artifact_ref: &str) -> Result<(), StoreError>;

    /// Transition pending → processing. Returns false if the job is not in
    /// `pending` (stale queue wake) or has no artifact yet.
    async fn mark_processing(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn mark_completed(
        &self,
        id: Uuid,
        total_rows: i32,
        processed_rows: i32,
        valid_count: i32,
        catchall_count: i32,
        cost: i64,
    ) -> Result<(), StoreError>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert(&self, lead: &Lead) -> Result<(), StoreError>;

    async fn insert_many(&self, leads: &[Lead]) -> Result<(), StoreError>;

    /// All leads recorded for a job, in insertion order.
    async fn leads_for_job(&self, job_id: Uuid) -> Result<Vec<Lead>, StoreError>;

    /// Flag an existing attempt as the final result for its person.
    async fn set_final(&self, lead_id: Uuid) -> Result<(), StoreError>;
}
