//! PostgreSQL store implementations.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::store::{JobStore, LeadStore, OrderStore, StoreError};
use crate::models::job::{EnrichmentJob, JobKind, JobStatus};
use crate::models::lead::{Lead, LeadOutcome};
use crate::models::order::{ExportFormat, OrderStatus, ScrapeOrder};

fn decode<T: FromStr>(value: &str, what: &str) -> Result<T, StoreError> {
    T::from_str(value).map_err(|_| StoreError::Decode(format!("bad {what}: '{value}'")))
}

fn order_from_row(row: &PgRow) -> Result<ScrapeOrder, StoreError> {
    let status: String = row.try_get("status")?;
    let export_format: String = row.try_get("export_format")?;
    Ok(ScrapeOrder {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        external_ref: row.try_get("external_ref")?,
        status: decode(&status, "order status")?,
        target_url: row.try_get("target_url")?,
        export_format: decode(&export_format, "export format")?,
        qualified_only: row.try_get("qualified_only")?,
        progress: row.try_get("progress")?,
        leads_found: row.try_get("leads_found")?,
        leads_qualified: row.try_get("leads_qualified")?,
        artifact_url: row.try_get("artifact_url")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, owner_id, external_ref, status, target_url, export_format, \
     qualified_only, progress, leads_found, leads_qualified, artifact_url, failure_reason, \
     created_at, completed_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &ScrapeOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scrape_orders
                (id, owner_id, external_ref, status, target_url, export_format,
                 qualified_only, progress, leads_found, leads_qualified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(order.owner_id)
        .bind(&order.external_ref)
        .bind(order.status.to_string())
        .bind(&order.target_url)
        .bind(order.export_format.to_string())
        .bind(order.qualified_only)
        .bind(order.progress)
        .bind(order.leads_found)
        .bind(order.leads_qualified)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScrapeOrder>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM scrape_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<ScrapeOrder>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM scrape_orders WHERE external_ref = $1"
        ))
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn active_order(&self) -> Result<Option<ScrapeOrder>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM scrape_orders \
             WHERE status = 'processing' AND external_ref IS NOT NULL \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn oldest_queued(&self) -> Result<Option<ScrapeOrder>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM scrape_orders \
             WHERE status = 'queued' ORDER BY created_at ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn mark_processing(&self, id: Uuid, external_ref: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE scrape_orders
            SET status = 'processing', external_ref = $2
            WHERE id = $1 AND status = 'queued' AND external_ref IS NULL
            "#,
        )
        .bind(id)
        .bind(external_ref)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        progress: i32,
        leads_found: i32,
        leads_qualified: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE scrape_orders
            SET progress = $2, leads_found = $3, leads_qualified = $4
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(progress)
        .bind(leads_found)
        .bind(leads_qualified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_counts(
        &self,
        id: Uuid,
        leads_found: i32,
        leads_qualified: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE scrape_orders
            SET leads_found = $2, leads_qualified = $3
            WHERE id = $1 AND status != 'failed'
            "#,
        )
        .bind(id)
        .bind(leads_found)
        .bind(leads_qualified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, artifact_url: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE scrape_orders
            SET status = 'completed', artifact_url = $2, progress = 100, completed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(artifact_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE scrape_orders
            SET status = 'failed', failure_reason = $2, completed_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'processing')
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn job_from_row(row: &PgRow) -> Result<EnrichmentJob, StoreError> {
    let status: String = row.try_get("status")?;
    let kind: String = row.try_get("kind")?;
    Ok(EnrichmentJob {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        status: decode(&status, "job status")?,
        kind: decode(&kind, "job kind")?,
        source: row.try_get("source")?,
        source_order_id: row.try_get("source_order_id")?,
        artifact_ref: row.try_get("artifact_ref")?,
        total_rows: row.try_get("total_rows")?,
        processed_rows: row.try_get("processed_rows")?,
        valid_count: row.try_get("valid_count")?,
        catchall_count: row.try_get("catchall_count")?,
        cost: row.try_get("cost")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const JOB_COLUMNS: &str = "id, owner_id, status, kind, source, source_order_id, artifact_ref, \
     total_rows, processed_rows, valid_count, catchall_count, cost, error, created_at, updated_at";

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &EnrichmentJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO enrichment_jobs
                (id, owner_id, status, kind, source, source_order_id, artifact_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(job.owner_id)
        .bind(job.status.to_string())
        .bind(job.kind.to_string())
        .bind(&job.source)
        .bind(job.source_order_id)
        .bind(&job.artifact_ref)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EnrichmentJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM enrichment_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_by_artifact(
        &self,
        owner_id: Uuid,
        artifact_ref: &str,
    ) -> Result<Option<EnrichmentJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM enrichment_jobs \
             WHERE owner_id = $1 AND artifact_ref = $2 \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(owner_id)
        .bind(artifact_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_placeholder_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<EnrichmentJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM enrichment_jobs \
             WHERE source_order_id = $1 AND status = 'waiting_for_artifact' \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn attach_artifact(&self, id: Uuid, artifact_ref: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET artifact_ref = $2, status = 'pending', updated_at = NOW()
            WHERE id = $1 AND status = 'waiting_for_artifact'
            "#,
        )
        .bind(id)
        .bind(artifact_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND artifact_ref IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
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
        sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET status = 'completed', total_rows = $2, processed_rows = $3,
                valid_count = $4, catchall_count = $5, cost = $6, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(total_rows)
        .bind(processed_rows)
        .bind(valid_count)
        .bind(catchall_count)
        .bind(cost)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn lead_from_row(row: &PgRow) -> Result<Lead, StoreError> {
    let outcome: String = row.try_get("outcome")?;
    Ok(Lead {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        domain: row.try_get("domain")?,
        company_size: row.try_get("company_size")?,
        email: row.try_get("email")?,
        pattern_id: row.try_get("pattern_id")?,
        score: row.try_get("score")?,
        outcome: decode(&outcome, "lead outcome")?,
        verification_tag: row.try_get("verification_tag")?,
        mx_host: row.try_get("mx_host")?,
        extra: row.try_get("extra")?,
        is_final_result: row.try_get("is_final_result")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn insert(&self, lead: &Lead) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO leads
                (id, job_id, first_name, last_name, domain, company_size, email,
                 pattern_id, score, outcome, verification_tag, mx_host, extra,
                 is_final_result, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(lead.id)
        .bind(lead.job_id)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.domain)
        .bind(&lead.company_size)
        .bind(&lead.email)
        .bind(lead.pattern_id)
        .bind(lead.score)
        .bind(lead.outcome.to_string())
        .bind(&lead.verification_tag)
        .bind(&lead.mx_host)
        .bind(&lead.extra)
        .bind(lead.is_final_result)
        .bind(lead.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_many(&self, leads: &[Lead]) -> Result<(), StoreError> {
        for lead in leads {
            self.insert(lead).await?;
        }
        Ok(())
    }

    async fn leads_for_job(&self, job_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, first_name, last_name, domain, company_size, email,
                   pattern_id, score, outcome, verification_tag, mx_host, extra,
                   is_final_result, created_at
            FROM leads
            WHERE job_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn set_final(&self, lead_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE leads SET is_final_result = TRUE WHERE id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
