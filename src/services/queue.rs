//! Redis-backed dispatch queue.
//!
//! The queue only wakes workers: every correctness decision is re-derived from
//! the database record after dequeue, so at-least-once delivery and stale
//! wakes are harmless.

use std::collections::VecDeque;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

const QUEUE_KEY: &str = "lead_enrich:jobs";
const PROCESSING_KEY: &str = "lead_enrich:processing";

/// Wake message serialized into Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobWake {
    pub job_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Worker wake-up dispatch.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError>;
    async fn dequeue(&self) -> Result<Option<JobWake>, QueueError>;
    /// Acknowledge a wake previously returned by `dequeue`.
    async fn complete(&self, wake: &JobWake) -> Result<(), QueueError>;
    async fn queue_depth(&self) -> Result<u64, QueueError>;
    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis list queue with a processing side-list for in-flight wakes.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&JobWake { job_id })?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<JobWake>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => {
                let wake: JobWake = serde_json::from_str(&payload)?;
                Ok(Some(wake))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, wake: &JobWake) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(wake)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-memory dispatcher for tests.
#[derive(Default)]
pub struct MemoryDispatcher {
    pending: Mutex<VecDeque<JobWake>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobDispatcher for MemoryDispatcher {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.pending.lock().await.push_back(JobWake { job_id });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<JobWake>, QueueError> {
        Ok(self.pending.lock().await.pop_front())
    }

    async fn complete(&self, _wake: &JobWake) -> Result<(), QueueError> {
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        Ok(self.pending.lock().await.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
