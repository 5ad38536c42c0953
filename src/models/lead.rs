use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Verification outcome recorded on a lead.
///
/// `NotFound` only appears on synthetic final results emitted by the
/// deduplicator when no candidate for a person verified as valid or catchall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadOutcome {
    Pending,
    Valid,
    Invalid,
    Catchall,
    Error,
    NotFound,
}

/// One verified (or attempted) email for one person within a job.
///
/// Within a job, exactly one lead per distinct person carries
/// `is_final_result = true`; all other attempts are retained as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub job_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub company_size: Option<String>,
    pub email: String,
    pub pattern_id: i32,
    pub score: i32,
    pub outcome: LeadOutcome,
    pub verification_tag: String,
    pub mx_host: Option<String>,
    pub extra: serde_json::Value,
    pub is_final_result: bool,
    pub created_at: DateTime<Utc>,
}
