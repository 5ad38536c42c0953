use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a scrape order against the external provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }
}

/// Artifact export format requested from the scraping provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

/// One request to the external lead-scraping provider.
///
/// The external reference is assigned at most once, atomically with the
/// queued → processing transition. Terminal orders are never mutated again
/// except to backfill the artifact location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOrder {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub external_ref: Option<String>,
    pub status: OrderStatus,
    pub target_url: String,
    pub export_format: ExportFormat,
    pub qualified_only: bool,
    pub progress: i32,
    pub leads_found: i32,
    pub leads_qualified: i32,
    pub artifact_url: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScrapeOrder {
    pub fn new(
        owner_id: Uuid,
        target_url: String,
        export_format: ExportFormat,
        qualified_only: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            external_ref: None,
            status: OrderStatus::Queued,
            target_url,
            export_format,
            qualified_only,
            progress: 0,
            leads_found: 0,
            leads_qualified: 0,
            artifact_url: None,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Deterministic object-storage key for this order's artifact.
    pub fn artifact_key(&self) -> String {
        format!("orders/{}/leads.{}", self.id, self.export_format.extension())
    }
}
