//! Enrichment pipeline.
//!
//! Consumes one pending job: reads its artifact, generates and verifies email
//! candidates per person, persists every attempt, then deduplicates into one
//! final result per person. The queue wake is advisory; every decision here is
//! re-derived from the job record, so duplicate and stale wakes are no-ops.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::db::store::{JobStore, LeadStore, StoreError};
use crate::models::job::JobStatus;
use crate::models::lead::{Lead, LeadOutcome};
use crate::services::dedupe;
use crate::services::oracle::{VerifyOracle, VerifyOutcome};
use crate::services::patterns;
use crate::services::quota::QuotaAllocator;
use crate::services::scheduler::{self, CandidateAttempt, ScheduleError, SchedulerConfig};
use crate::services::storage::ArtifactStore;

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("artifact error: {0}")]
    Artifact(#[from] crate::services::storage::StorageError),

    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

/// One input row parsed from the artifact.
#[derive(Debug, Clone)]
struct PersonRow {
    first_name: String,
    last_name: String,
    company: Option<String>,
    domain: String,
    company_size: Option<String>,
}

/// Parse artifact rows. Columns are matched by header name; rows missing a
/// name or domain are logged and skipped rather than failing the job.
fn parse_rows(bytes: &[u8]) -> Vec<PersonRow> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "artifact has no readable header row");
            return Vec::new();
        }
    };

    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    };
    let first_col = col("first_name");
    let last_col = col("last_name");
    let company_col = col("company");
    let domain_col = col("domain");
    let size_col = col("company_size");

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(row = i, error = %e, "skipping malformed artifact row");
                continue;
            }
        };
        let field = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|c| record.get(c))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let first_name = field(first_col).unwrap_or_default();
        let last_name = field(last_col).unwrap_or_default();
        let domain = field(domain_col).unwrap_or_default();
        if (first_name.is_empty() && last_name.is_empty()) || domain.is_empty() {
            tracing::warn!(row = i, "skipping artifact row missing name or domain");
            continue;
        }

        rows.push(PersonRow {
            first_name,
            last_name,
            company: field(company_col),
            domain,
            company_size: field(size_col),
        });
    }
    rows
}

fn attempt_to_lead(job_id: Uuid, row: &PersonRow, attempt: &CandidateAttempt) -> Lead {
    let outcome = match attempt.outcome {
        VerifyOutcome::Valid => LeadOutcome::Valid,
        VerifyOutcome::Invalid => LeadOutcome::Invalid,
        VerifyOutcome::Catchall => LeadOutcome::Catchall,
        VerifyOutcome::Error => LeadOutcome::Error,
    };
    Lead {
        id: Uuid::new_v4(),
        job_id,
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        domain: patterns::normalize_domain(&row.domain),
        company_size: row.company_size.clone(),
        email: attempt.email.clone(),
        pattern_id: attempt.pattern_id as i32,
        score: attempt.score as i32,
        outcome,
        verification_tag: attempt.tag.clone(),
        mx_host: attempt.mx_host.clone(),
        extra: match &row.company {
            Some(company) => json!({ "company": company }),
            None => serde_json::Value::Null,
        },
        is_final_result: false,
        created_at: Utc::now(),
    }
}

/// Synthetic final result for a person whose inputs yield no candidates.
fn unenrichable_lead(job_id: Uuid, row: &PersonRow) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        job_id,
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        domain: patterns::normalize_domain(&row.domain),
        company_size: row.company_size.clone(),
        email: String::new(),
        pattern_id: 0,
        score: 0,
        outcome: LeadOutcome::NotFound,
        verification_tag: "generator:empty".to_string(),
        mx_host: None,
        extra: match &row.company {
            Some(company) => json!({ "company": company }),
            None => serde_json::Value::Null,
        },
        is_final_result: true,
        created_at: Utc::now(),
    }
}

pub struct EnrichmentWorker<'a> {
    pub jobs: &'a dyn JobStore,
    pub leads: &'a dyn LeadStore,
    pub artifacts: &'a dyn ArtifactStore,
    pub oracle: &'a dyn VerifyOracle,
    pub quota: &'a dyn QuotaAllocator,
    pub scheduler: SchedulerConfig,
}

impl<'a> EnrichmentWorker<'a> {
    /// Process one job wake. Returns whether any work was done.
    pub async fn process_job(&self, job_id: Uuid) -> Result<bool, EnrichError> {
        let job = match self.jobs.get(job_id).await? {
            Some(job) => job,
            None => {
                tracing::warn!(%job_id, "wake for unknown job, dropping");
                return Ok(false);
            }
        };

        if job.status != JobStatus::Pending {
            tracing::debug!(%job_id, status = %job.status, "wake for non-pending job, dropping");
            return Ok(false);
        }

        // Atomic pending → processing; losing the race means another worker
        // has the job.
        if !self.jobs.mark_processing(job_id).await? {
            tracing::debug!(%job_id, "job claimed elsewhere");
            return Ok(false);
        }

        tracing::info!(%job_id, "enrichment started");
        metrics::counter!("enrichment_jobs_started").increment(1);

        let artifact_ref = match &job.artifact_ref {
            Some(r) => r.clone(),
            None => {
                // mark_processing requires a non-null artifact, so this is a
                // store inconsistency rather than an expected state.
                self.jobs.mark_failed(job_id, "no artifact attached").await?;
                return Ok(true);
            }
        };

        match self.enrich(job_id, &artifact_ref).await {
            Ok(()) => Ok(true),
            Err(EnrichError::Schedule(ScheduleError::QuotaExhausted)) => {
                tracing::error!(%job_id, "daily verification quota exhausted");
                self.jobs
                    .mark_failed(job_id, "verification quota exhausted")
                    .await?;
                metrics::counter!("enrichment_jobs_failed").increment(1);
                Ok(true)
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "enrichment failed");
                self.jobs.mark_failed(job_id, &e.to_string()).await?;
                metrics::counter!("enrichment_jobs_failed").increment(1);
                Ok(true)
            }
        }
    }

    async fn enrich(&self, job_id: Uuid, artifact_ref: &str) -> Result<(), EnrichError> {
        let bytes = self.artifacts.get(artifact_ref).await?;
        let rows = parse_rows(&bytes);
        let total_rows = rows.len() as i32;
        tracing::info!(%job_id, rows = total_rows, "artifact parsed");

        let mut processed = 0i32;
        let mut oracle_calls = 0i64;
        // Dedup happens over persisted attempts below, but unenrichable rows
        // never produce attempts, so duplicates of the same person are
        // collapsed here by the same case-insensitive key the dedup pass uses.
        let mut unenrichable_seen: HashSet<(String, String, String)> = HashSet::new();

        for row in &rows {
            let first = patterns::clean_name(&row.first_name);
            let last = patterns::clean_name(&row.last_name);
            let domain = patterns::normalize_domain(&row.domain);
            let bucket = patterns::parse_size_bucket(row.company_size.as_deref());

            let attempts = scheduler::verify_person(
                self.oracle,
                self.quota,
                &first,
                &last,
                &domain,
                bucket,
                &self.scheduler,
            )
            .await?;

            if attempts.is_empty() {
                let key = (
                    row.first_name.to_lowercase(),
                    row.last_name.to_lowercase(),
                    domain.clone(),
                );
                if unenrichable_seen.insert(key) {
                    // Already final; excluded from the dedup pass below.
                    self.leads.insert(&unenrichable_lead(job_id, row)).await?;
                }
            } else {
                oracle_calls += attempts.len() as i64;
                let leads: Vec<Lead> = attempts
                    .iter()
                    .map(|a| attempt_to_lead(job_id, row, a))
                    .collect();
                self.leads.insert_many(&leads).await?;
            }

            processed += 1;
        }

        // Deduplicate over everything persisted for this job. Synthetic rows
        // inserted above already carry their final flag and survive the
        // reduction as the sole member of their group.
        let all_attempts: Vec<Lead> = self
            .leads
            .leads_for_job(job_id)
            .await?
            .into_iter()
            .filter(|l| !l.is_final_result)
            .collect();

        let finals = dedupe::select_final_results(&all_attempts);
        let mut valid_count = 0i32;
        let mut catchall_count = 0i32;

        for lead in &finals {
            match lead.outcome {
                LeadOutcome::Valid => valid_count += 1,
                LeadOutcome::Catchall => catchall_count += 1,
                _ => {}
            }
            if all_attempts.iter().any(|a| a.id == lead.id) {
                self.leads.set_final(lead.id).await?;
            } else {
                self.leads.insert(lead).await?;
            }
        }

        self.jobs
            .mark_completed(
                job_id,
                total_rows,
                processed,
                valid_count,
                catchall_count,
                oracle_calls,
            )
            .await?;

        metrics::counter!("enrichment_jobs_completed").increment(1);
        metrics::counter!("enrichment_rows_processed").increment(processed as u64);
        tracing::info!(
            %job_id,
            processed,
            valid = valid_count,
            catchall = catchall_count,
            oracle_calls,
            "enrichment completed"
        );
        Ok(())
    }
}
