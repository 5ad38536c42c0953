use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lead_enrich::app_state::AppState;
use lead_enrich::config::AppConfig;
use lead_enrich::db;
use lead_enrich::db::pg::{PgJobStore, PgLeadStore, PgOrderStore};
use lead_enrich::routes;
use lead_enrich::services::credits::PgCreditLedger;
use lead_enrich::services::queue::JobQueue;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing lead-enrich server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("scrape_orders_created", "Scrape orders accepted by the API");
    metrics::describe_counter!("scrape_orders_submitted", "Orders submitted to the provider");
    metrics::describe_counter!("scrape_orders_completed", "Orders with a stored artifact");
    metrics::describe_counter!("scrape_orders_failed", "Orders that reached the failed state");
    metrics::describe_gauge!(
        "coordinator_active_orders",
        "Orders currently in flight against the provider (0 or 1)"
    );
    metrics::describe_counter!("enrichment_jobs_created", "Enrichment jobs created");
    metrics::describe_counter!("enrichment_jobs_started", "Enrichment jobs picked up by a worker");
    metrics::describe_counter!("enrichment_jobs_completed", "Enrichment jobs completed");
    metrics::describe_counter!("enrichment_jobs_failed", "Enrichment jobs that failed");
    metrics::describe_counter!("enrichment_rows_processed", "Artifact rows processed");
    metrics::describe_counter!("oracle_calls_total", "Verification oracle calls issued");
    metrics::describe_gauge!(
        "enrichment_queue_depth",
        "Pending job wakes in the dispatch queue"
    );
    metrics::describe_counter!("webhook_accepted_total", "Accepted scrape-complete deliveries");
    metrics::describe_counter!("webhook_rejected_total", "Rejected scrape-complete deliveries");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Create shared application state
    let state = AppState {
        db: db_pool.clone(),
        orders: Arc::new(PgOrderStore::new(db_pool.clone())),
        jobs: Arc::new(PgJobStore::new(db_pool.clone())),
        leads: Arc::new(PgLeadStore::new(db_pool.clone())),
        queue: Arc::new(queue),
        ledger: Arc::new(PgCreditLedger::new(db_pool)),
        webhook_secret: config.webhook_secret.clone(),
    };

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/orders", post(routes::orders::create_order))
        .route("/api/v1/orders/{order_id}", get(routes::orders::get_order))
        .route("/api/v1/jobs", post(routes::jobs::create_job))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job))
        .route(
            "/api/v1/webhooks/scrape-complete",
            post(routes::webhook::scrape_complete),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)); // 2 MB limit

    tracing::info!("Starting lead-enrich on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
