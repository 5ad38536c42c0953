use serde::Deserialize;
use std::time::Duration;

use crate::services::scheduler::{SchedulerConfig, StopPolicy};
use crate::workers::coordinator::CoordinatorConfig;
use crate::workers::order_machine::OrderMachineConfig;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue and quota counters
    pub redis_url: String,

    /// S3-compatible bucket name for artifacts
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    /// Base URL of the lead-scraping provider API
    pub scraper_base_url: String,

    /// Session credential for the scraping provider
    pub scraper_session: String,

    /// Shared secret expected on scrape-complete webhook deliveries
    pub webhook_secret: String,

    /// Base URL of the email verification oracle
    pub oracle_base_url: String,

    /// Comma-separated oracle API keys; quota rotates across them
    pub oracle_api_keys: String,

    /// Per-key daily oracle call cap
    #[serde(default = "default_oracle_daily_cap")]
    pub oracle_daily_cap: u32,

    /// Minimum milliseconds between consecutive oracle calls
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,

    /// Stop verifying a person at the first valid candidate
    #[serde(default)]
    pub stop_at_first_valid: bool,

    /// Seconds between provider status polls for an in-flight order
    #[serde(default = "default_order_poll_secs")]
    pub order_poll_secs: u64,

    /// Maximum seconds an order may stay in flight before timing out
    #[serde(default = "default_order_max_wait_secs")]
    pub order_max_wait_secs: u64,

    /// First export retry delay in milliseconds
    #[serde(default = "default_export_retry_base_ms")]
    pub export_retry_base_ms: u64,

    /// Multiplier applied to the export retry delay per attempt
    #[serde(default = "default_export_backoff_multiplier")]
    pub export_backoff_multiplier: f64,

    /// Maximum export attempts before the order fails
    #[serde(default = "default_export_max_attempts")]
    pub export_max_attempts: u32,

    /// Coordinator sleep in seconds when no order is queued
    #[serde(default = "default_coordinator_idle_secs")]
    pub coordinator_idle_secs: u64,

    /// Worker sleep in milliseconds when the queue is empty
    #[serde(default = "default_worker_poll_ms")]
    pub worker_poll_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_oracle_daily_cap() -> u32 {
    10_000
}

fn default_verify_delay_ms() -> u64 {
    200
}

fn default_order_poll_secs() -> u64 {
    15
}

fn default_order_max_wait_secs() -> u64 {
    3600
}

fn default_export_retry_base_ms() -> u64 {
    2000
}

fn default_export_backoff_multiplier() -> f64 {
    2.0
}

fn default_export_max_attempts() -> u32 {
    5
}

fn default_coordinator_idle_secs() -> u64 {
    10
}

fn default_worker_poll_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn oracle_keys(&self) -> Vec<String> {
        self.oracle_api_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            inter_call_delay: Duration::from_millis(self.verify_delay_ms),
            stop_policy: if self.stop_at_first_valid {
                StopPolicy::StopAtFirstValid
            } else {
                StopPolicy::VerifyAll
            },
        }
    }

    pub fn order_machine_config(&self) -> OrderMachineConfig {
        OrderMachineConfig {
            poll_interval: Duration::from_secs(self.order_poll_secs),
            max_wait: Duration::from_secs(self.order_max_wait_secs),
            export_base_delay: Duration::from_millis(self.export_retry_base_ms),
            export_backoff: self.export_backoff_multiplier,
            export_max_attempts: self.export_max_attempts,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            idle_poll: Duration::from_secs(self.coordinator_idle_secs),
            machine: self.order_machine_config(),
        }
    }
}
