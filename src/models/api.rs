use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::EnrichmentJob;
use crate::models::order::{ExportFormat, ScrapeOrder};

/// Request to create a new scrape order.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[garde(skip)]
    pub owner_id: Uuid,

    #[garde(length(min = 1, max = 2000))]
    pub target_url: String,

    #[garde(skip)]
    #[serde(default = "default_export_format")]
    pub export_format: ExportFormat,

    #[garde(skip)]
    #[serde(default)]
    pub qualified_only: bool,

    /// Provider-estimated result count, used to size the credit charge.
    #[garde(range(min = 0, max = 1_000_000))]
    #[serde(default)]
    pub estimated_results: i64,
}

fn default_export_format() -> ExportFormat {
    ExportFormat::Csv
}

/// Response after accepting a scrape order.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

/// Response for querying order status.
#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: String,
    pub progress: i32,
    pub leads_found: i32,
    pub leads_qualified: i32,
    pub artifact_url: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<&ScrapeOrder> for OrderStatusResponse {
    fn from(order: &ScrapeOrder) -> Self {
        Self {
            order_id: order.id,
            status: order.status.to_string(),
            progress: order.progress,
            leads_found: order.leads_found,
            leads_qualified: order.leads_qualified,
            artifact_url: order.artifact_url.clone(),
            failure_reason: order.failure_reason.clone(),
        }
    }
}

/// Request to create an enrichment job over an already-uploaded artifact.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(skip)]
    pub owner_id: Uuid,

    #[garde(length(min = 1, max = 1000))]
    pub artifact_key: String,

    #[garde(length(min = 1, max = 100))]
    #[serde(default = "default_job_source")]
    pub source: String,
}

fn default_job_source() -> String {
    "upload".to_string()
}

/// Response for querying job status and counters.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub valid_count: i32,
    pub catchall_count: i32,
    pub cost: i64,
    pub error: Option<String>,
}

impl From<&EnrichmentJob> for JobStatusResponse {
    fn from(job: &EnrichmentJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status.to_string(),
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            valid_count: job.valid_count,
            catchall_count: job.catchall_count,
            cost: job.cost,
            error: job.error.clone(),
        }
    }
}

/// Completion signal delivered by the scraping provider pipeline.
///
/// Delivery is at-least-once; the listener must treat replays as no-ops.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HandoffPayload {
    #[garde(length(min = 1, max = 200))]
    pub order_reference: String,

    #[garde(skip)]
    pub owner_id: Uuid,

    #[garde(length(min = 1, max = 1000))]
    pub artifact_url: String,

    #[garde(range(min = 0))]
    pub leads_found: Option<i32>,

    #[garde(range(min = 0))]
    pub leads_qualified: Option<i32>,
}

/// Response to the scraping provider pipeline.
#[derive(Debug, Serialize)]
pub struct HandoffResponse {
    pub status: String,
    pub message: String,
    pub job_id: Option<Uuid>,
}
