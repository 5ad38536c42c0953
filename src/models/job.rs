use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of an enrichment job.
///
/// `WaitingForArtifact` is the placeholder state for jobs created eagerly when
/// a scrape order is accepted, before the provider has produced an artifact.
/// A job may only move to `Processing` once its artifact reference is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    WaitingForArtifact,
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Enrichment,
    Verification,
}

/// One batch verification run over a set of candidate people.
///
/// At most one job exists per (owner, artifact reference) pair; the webhook
/// listener enforces this before creation so duplicate deliveries are no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: JobStatus,
    pub kind: JobKind,
    pub source: String,
    pub source_order_id: Option<Uuid>,
    pub artifact_ref: Option<String>,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub valid_count: i32,
    pub catchall_count: i32,
    pub cost: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentJob {
    /// Placeholder job created when a scrape order is accepted, before any
    /// artifact exists.
    pub fn placeholder(owner_id: Uuid, order_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            status: JobStatus::WaitingForArtifact,
            kind: JobKind::Enrichment,
            source: "scraper".to_string(),
            source_order_id: Some(order_id),
            artifact_ref: None,
            total_rows: 0,
            processed_rows: 0,
            valid_count: 0,
            catchall_count: 0,
            cost: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Job created directly over an already-uploaded artifact.
    pub fn from_artifact(owner_id: Uuid, artifact_ref: String, source: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            status: JobStatus::Pending,
            kind: JobKind::Enrichment,
            source,
            source_order_id: None,
            artifact_ref: Some(artifact_ref),
            total_rows: 0,
            processed_rows: 0,
            valid_count: 0,
            catchall_count: 0,
            cost: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
