//! Scrape-order coordinator.
//!
//! Runs the single-flight order loop: resume any in-flight order, otherwise
//! drive the oldest queued order through the provider state machine.

use tracing_subscriber::EnvFilter;

use lead_enrich::config::AppConfig;
use lead_enrich::db;
use lead_enrich::db::pg::PgOrderStore;
use lead_enrich::services::provider::LeadScraperClient;
use lead_enrich::services::storage::S3ArtifactStore;
use lead_enrich::workers::coordinator::QueueCoordinator;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Starting scrape-order coordinator");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let orders = PgOrderStore::new(db_pool);
    let provider = LeadScraperClient::new(&config.scraper_base_url)
        .expect("Failed to initialize scraper client");
    let artifacts = S3ArtifactStore::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize artifact storage");

    let coordinator = QueueCoordinator::new(
        &provider,
        &orders,
        &artifacts,
        &config.scraper_session,
        config.coordinator_config(),
    );

    tracing::info!("Coordinator ready");
    coordinator.run_forever().await;
}
