//! Scrape-complete handoff listener.
//!
//! The scraping pipeline delivers completion signals at least once, so this
//! endpoint must be idempotent: exactly one enrichment job exists per
//! (owner, artifact reference), and replays acknowledge without side effects.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{HandoffPayload, HandoffResponse};
use crate::models::job::EnrichmentJob;

const SECRET_HEADER: &str = "x-webhook-secret";

/// POST /api/v1/webhooks/scrape-complete
pub async fn scrape_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HandoffPayload>,
) -> (StatusCode, Json<HandoffResponse>) {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented != state.webhook_secret {
        metrics::counter!("webhook_rejected_total").increment(1);
        return (
            StatusCode::UNAUTHORIZED,
            Json(HandoffResponse {
                status: "rejected".to_string(),
                message: "invalid webhook secret".to_string(),
                job_id: None,
            }),
        );
    }

    if let Err(e) = payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(HandoffResponse {
                status: "rejected".to_string(),
                message: e.to_string(),
                job_id: None,
            }),
        );
    }

    match handle(&state, &payload).await {
        Ok((job_id, message)) => {
            metrics::counter!("webhook_accepted_total").increment(1);
            (
                StatusCode::OK,
                Json(HandoffResponse {
                    status: "ok".to_string(),
                    message,
                    job_id: Some(job_id),
                }),
            )
        }
        Err(e) => {
            tracing::error!(
                order_reference = %payload.order_reference,
                error = %e,
                "handoff processing failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HandoffResponse {
                    status: "error".to_string(),
                    message: "internal error".to_string(),
                    job_id: None,
                }),
            )
        }
    }
}

async fn handle(
    state: &AppState,
    payload: &HandoffPayload,
) -> Result<(Uuid, String), Box<dyn std::error::Error>> {
    // Replay: a job for this (owner, artifact) already exists.
    if let Some(existing) = state
        .jobs
        .find_by_artifact(payload.owner_id, &payload.artifact_url)
        .await?
    {
        tracing::info!(
            job_id = %existing.id,
            order_reference = %payload.order_reference,
            "duplicate handoff delivery, acknowledging"
        );
        return Ok((existing.id, "already processed".to_string()));
    }

    // Match the delivery back to a known order; backfill its counters and
    // promote the placeholder job when one exists.
    if let Some(order) = state
        .orders
        .find_by_external_ref(&payload.order_reference)
        .await?
    {
        if let (Some(found), Some(qualified)) = (payload.leads_found, payload.leads_qualified) {
            state.orders.update_counts(order.id, found, qualified).await?;
        }

        if let Some(placeholder) = state.jobs.find_placeholder_for_order(order.id).await? {
            state
                .jobs
                .attach_artifact(placeholder.id, &payload.artifact_url)
                .await?;
            state.queue.enqueue(placeholder.id).await?;
            tracing::info!(
                job_id = %placeholder.id,
                order_id = %order.id,
                "artifact attached to placeholder job"
            );
            return Ok((placeholder.id, "job scheduled".to_string()));
        }
    }

    // Unknown order or no placeholder left: materialize a fresh job so the
    // artifact is still enriched.
    let job = EnrichmentJob::from_artifact(
        payload.owner_id,
        payload.artifact_url.clone(),
        "scraper".to_string(),
    );
    state.jobs.insert(&job).await?;
    state.queue.enqueue(job.id).await?;
    tracing::info!(job_id = %job.id, order_reference = %payload.order_reference, "handoff job created");
    Ok((job.id, "job scheduled".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryJobStore, MemoryLeadStore, MemoryOrderStore};
    use crate::db::store::{JobStore, OrderStore};
    use crate::models::job::JobStatus;
    use crate::models::order::{ExportFormat, ScrapeOrder};
    use crate::services::credits::NullLedger;
    use crate::services::queue::{JobDispatcher, MemoryDispatcher};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn test_state() -> (AppState, Arc<MemoryOrderStore>, Arc<MemoryJobStore>, Arc<MemoryDispatcher>) {
        let orders = Arc::new(MemoryOrderStore::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryDispatcher::new());
        // Lazy pool: never connected by these handlers.
        let db = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let state = AppState {
            db,
            orders: orders.clone(),
            jobs: jobs.clone(),
            leads: Arc::new(MemoryLeadStore::new()),
            queue: queue.clone(),
            ledger: Arc::new(NullLedger),
            webhook_secret: "s3cret".to_string(),
        };
        (state, orders, jobs, queue)
    }

    fn payload(owner_id: Uuid) -> HandoffPayload {
        HandoffPayload {
            order_reference: "ext-77".to_string(),
            owner_id,
            artifact_url: "https://provider.test/artifacts/77.csv".to_string(),
            leads_found: Some(40),
            leads_qualified: Some(12),
        }
    }

    fn headers_with_secret(secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, secret.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_bad_secret_is_unauthorized() {
        let (state, _, jobs, _) = test_state();
        let (status, _) = scrape_complete(
            State(state),
            headers_with_secret("wrong"),
            Json(payload(Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(jobs.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_handoff_promotes_placeholder_and_backfills_counts() {
        let (state, orders, jobs, queue) = test_state();
        let owner = Uuid::new_v4();

        let order = ScrapeOrder::new(
            owner,
            "https://example.com/a".to_string(),
            ExportFormat::Csv,
            false,
        );
        orders.insert(&order).await.unwrap();
        assert!(orders.mark_processing(order.id, "ext-77").await.unwrap());

        let placeholder = EnrichmentJob::placeholder(owner, order.id);
        jobs.insert(&placeholder).await.unwrap();

        let (status, Json(body)) = scrape_complete(
            State(state),
            headers_with_secret("s3cret"),
            Json(payload(owner)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.job_id, Some(placeholder.id));

        let promoted = jobs.get(placeholder.id).await.unwrap().unwrap();
        assert_eq!(promoted.status, JobStatus::Pending);
        assert_eq!(
            promoted.artifact_ref.as_deref(),
            Some("https://provider.test/artifacts/77.csv")
        );

        let stored = orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.leads_found, 40);
        assert_eq!(stored.leads_qualified, 12);

        assert_eq!(queue.queue_depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_acknowledged_without_second_job() {
        let (state, orders, jobs, queue) = test_state();
        let owner = Uuid::new_v4();

        let order = ScrapeOrder::new(
            owner,
            "https://example.com/a".to_string(),
            ExportFormat::Csv,
            false,
        );
        orders.insert(&order).await.unwrap();
        assert!(orders.mark_processing(order.id, "ext-77").await.unwrap());
        jobs.insert(&EnrichmentJob::placeholder(owner, order.id))
            .await
            .unwrap();

        let first = scrape_complete(
            State(state.clone()),
            headers_with_secret("s3cret"),
            Json(payload(owner)),
        )
        .await;
        let second = scrape_complete(
            State(state),
            headers_with_secret("s3cret"),
            Json(payload(owner)),
        )
        .await;

        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);
        assert_eq!(first.1 .0.job_id, second.1 .0.job_id);
        assert_eq!(jobs.all().await.len(), 1);
        // Only the first delivery enqueued a wake.
        assert_eq!(queue.queue_depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order_still_materializes_job() {
        let (state, _, jobs, queue) = test_state();
        let owner = Uuid::new_v4();

        let (status, Json(body)) = scrape_complete(
            State(state),
            headers_with_secret("s3cret"),
            Json(payload(owner)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let job_id = body.job_id.unwrap();
        let job = jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.source, "scraper");
        assert_eq!(queue.queue_depth().await.unwrap(), 1);
    }
}
