//! Enrichment worker.
//!
//! Dequeues job wakes from Redis and runs the enrichment pipeline for each.
//! Every correctness decision is re-derived from the job record after
//! dequeue, so duplicate wakes and crashes mid-job are safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use lead_enrich::config::AppConfig;
use lead_enrich::db;
use lead_enrich::db::pg::{PgJobStore, PgLeadStore};
use lead_enrich::services::oracle::EmailOracleClient;
use lead_enrich::services::queue::{JobDispatcher, JobQueue};
use lead_enrich::services::quota::RedisQuota;
use lead_enrich::services::storage::S3ArtifactStore;
use lead_enrich::workers::enrichment::EnrichmentWorker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Starting enrichment worker");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let jobs = PgJobStore::new(db_pool.clone());
    let leads = PgLeadStore::new(db_pool);
    let queue: Arc<dyn JobDispatcher> =
        Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));
    let artifacts = S3ArtifactStore::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize artifact storage");
    let oracle = EmailOracleClient::new(&config.oracle_base_url)
        .expect("Failed to initialize oracle client");
    let quota = RedisQuota::new(
        &config.redis_url,
        config.oracle_keys(),
        config.oracle_daily_cap,
    )
    .expect("Failed to initialize quota allocator");

    let worker = EnrichmentWorker {
        jobs: &jobs,
        leads: &leads,
        artifacts: &artifacts,
        oracle: &oracle,
        quota: &quota,
        scheduler: config.scheduler_config(),
    };

    let idle = Duration::from_millis(config.worker_poll_ms);
    tracing::info!("Enrichment worker ready, polling for jobs");

    loop {
        match queue.dequeue().await {
            Ok(Some(wake)) => {
                let job_id = wake.job_id;
                if let Err(e) = worker.process_job(job_id).await {
                    // The pipeline records job-level failures itself; an error
                    // here means the store or artifact layer is unhealthy.
                    tracing::error!(%job_id, error = %e, "job processing error");
                }
                if let Err(e) = queue.complete(&wake).await {
                    tracing::error!(%job_id, error = %e, "failed to acknowledge wake");
                }
            }
            Ok(None) => {
                if let Ok(depth) = queue.queue_depth().await {
                    metrics::gauge!("enrichment_queue_depth").set(depth as f64);
                }
                sleep(idle).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "dequeue failed, will retry");
                sleep(idle).await;
            }
        }
    }
}
