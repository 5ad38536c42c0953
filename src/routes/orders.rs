//! Scrape order intake and status.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{CreateOrderRequest, CreateOrderResponse, OrderStatusResponse};
use crate::models::job::EnrichmentJob;
use crate::models::order::ScrapeOrder;
use crate::services::credits;

/// POST /api/v1/orders — accept a scrape order.
///
/// The credit charge is recorded before the order is persisted, and a
/// placeholder enrichment job is created eagerly so the caller gets both ids
/// up front. The order itself starts queued; the coordinator picks it up.
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), (StatusCode, Json<Value>)> {
    if let Err(e) = req.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ));
    }

    let amount = credits::order_charge(req.estimated_results);
    state.ledger.charge(req.owner_id, amount).await.map_err(|e| {
        tracing::error!(error = %e, "failed to record credit charge");
        internal_error()
    })?;

    let order = ScrapeOrder::new(
        req.owner_id,
        req.target_url,
        req.export_format,
        req.qualified_only,
    );
    let job = EnrichmentJob::placeholder(req.owner_id, order.id);

    state.orders.insert(&order).await.map_err(|e| {
        tracing::error!(error = %e, "failed to persist order");
        internal_error()
    })?;
    state.jobs.insert(&job).await.map_err(|e| {
        tracing::error!(error = %e, "failed to persist placeholder job");
        internal_error()
    })?;

    metrics::counter!("scrape_orders_created").increment(1);
    tracing::info!(order_id = %order.id, job_id = %job.id, charge = amount, "order accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateOrderResponse {
            order_id: order.id,
            job_id: job.id,
            status: order.status.to_string(),
            message: "order queued".to_string(),
        }),
    ))
}

/// GET /api/v1/orders/{order_id} — order status and progress counters.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, (StatusCode, Json<Value>)> {
    let order = state.orders.get(order_id).await.map_err(|e| {
        tracing::error!(error = %e, "failed to load order");
        internal_error()
    })?;

    match order {
        Some(order) => Ok(Json(OrderStatusResponse::from(&order))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "order not found" })),
        )),
    }
}

fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}
