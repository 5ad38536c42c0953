//! Daily call-budget accounting for the verification oracle.
//!
//! The oracle enforces a per-credential daily cap regardless of which job is
//! calling, so the allocator is shared state consulted by every verification
//! worker before issuing calls. Counters are keyed by (credential, UTC day)
//! and expire shortly after the day boundary so stale usage never leaks into
//! the next day's accounting.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use redis::AsyncCommands;
use tokio::sync::Mutex;

/// Safety margin added to the day-boundary expiry.
const EXPIRY_MARGIN_SECS: i64 = 3600;

const QUOTA_KEY_PREFIX: &str = "lead_enrich:verify_quota";

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Shared per-credential daily budget tracking.
#[async_trait]
pub trait QuotaAllocator: Send + Sync {
    /// Record `n` oracle calls against a credential for the current day.
    async fn charge(&self, credential: &str, n: u32) -> Result<(), QuotaError>;

    /// Remaining budget for a credential today, floored at zero.
    async fn remaining(&self, credential: &str) -> Result<u32, QuotaError>;

    /// The credential with the largest remaining budget, or `None` when every
    /// credential is exhausted.
    async fn best_credential(&self) -> Result<Option<String>, QuotaError>;
}

fn day_key(credential: &str) -> String {
    format!(
        "{}:{}:{}",
        QUOTA_KEY_PREFIX,
        credential,
        Utc::now().format("%Y%m%d")
    )
}

fn seconds_until_day_rollover() -> i64 {
    let now = Utc::now();
    let tomorrow = (now + chrono::Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    (tomorrow.and_utc() - now).num_seconds() + EXPIRY_MARGIN_SECS
}

/// Redis-backed allocator. `INCRBY` keeps the increment atomic across worker
/// processes; the key expires after the day boundary plus a safety margin.
pub struct RedisQuota {
    client: redis::Client,
    credentials: Vec<String>,
    daily_cap: u32,
}

impl RedisQuota {
    pub fn new(
        redis_url: &str,
        credentials: Vec<String>,
        daily_cap: u32,
    ) -> Result<Self, QuotaError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            credentials,
            daily_cap,
        })
    }
}

#[async_trait]
impl QuotaAllocator for RedisQuota {
    async fn charge(&self, credential: &str, n: u32) -> Result<(), QuotaError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = day_key(credential);
        conn.incr::<_, _, u64>(&key, n as u64).await?;
        conn.expire::<_, ()>(&key, seconds_until_day_rollover()).await?;
        Ok(())
    }

    async fn remaining(&self, credential: &str) -> Result<u32, QuotaError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let used: Option<u64> = conn.get(day_key(credential)).await?;
        let used = used.unwrap_or(0).min(u32::MAX as u64) as u32;
        Ok(self.daily_cap.saturating_sub(used))
    }

    async fn best_credential(&self) -> Result<Option<String>, QuotaError> {
        let mut best: Option<(String, u32)> = None;
        for credential in &self.credentials {
            let left = self.remaining(credential).await?;
            if left == 0 {
                continue;
            }
            match &best {
                Some((_, current)) if *current >= left => {}
                _ => best = Some((credential.clone(), left)),
            }
        }
        Ok(best.map(|(credential, _)| credential))
    }
}

/// In-memory allocator for tests and single-process deployments. Counters
/// reset when the stored day no longer matches the current UTC day.
pub struct MemoryQuota {
    usage: Mutex<HashMap<String, (NaiveDate, u32)>>,
    credentials: Vec<String>,
    daily_cap: u32,
}

impl MemoryQuota {
    pub fn new(credentials: Vec<String>, daily_cap: u32) -> Self {
        Self {
            usage: Mutex::new(HashMap::new()),
            credentials,
            daily_cap,
        }
    }
}

#[async_trait]
impl QuotaAllocator for MemoryQuota {
    async fn charge(&self, credential: &str, n: u32) -> Result<(), QuotaError> {
        let today = Utc::now().date_naive();
        let mut usage = self.usage.lock().await;
        let entry = usage.entry(credential.to_string()).or_insert((today, 0));
        if entry.0 != today {
            *entry = (today, 0);
        }
        entry.1 = entry.1.saturating_add(n);
        Ok(())
    }

    async fn remaining(&self, credential: &str) -> Result<u32, QuotaError> {
        let today = Utc::now().date_naive();
        let usage = self.usage.lock().await;
        let used = match usage.get(credential) {
            Some((day, used)) if *day == today => *used,
            _ => 0,
        };
        Ok(self.daily_cap.saturating_sub(used))
    }

    async fn best_credential(&self) -> Result<Option<String>, QuotaError> {
        let mut best: Option<(String, u32)> = None;
        for credential in &self.credentials {
            let left = self.remaining(credential).await?;
            if left == 0 {
                continue;
            }
            match &best {
                Some((_, current)) if *current >= left => {}
                _ => best = Some((credential.clone(), left)),
            }
        }
        Ok(best.map(|(credential, _)| credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_charge_then_remaining() {
        let quota = MemoryQuota::new(vec!["k1".to_string()], 100);
        quota.charge("k1", 30).await.unwrap();
        assert_eq!(quota.remaining("k1").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_remaining_never_negative() {
        let quota = MemoryQuota::new(vec!["k1".to_string()], 10);
        quota.charge("k1", 25).await.unwrap();
        assert_eq!(quota.remaining("k1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_best_credential_picks_least_utilized() {
        let quota = MemoryQuota::new(vec!["k1".to_string(), "k2".to_string()], 100);
        quota.charge("k1", 60).await.unwrap();
        quota.charge("k2", 10).await.unwrap();
        assert_eq!(quota.best_credential().await.unwrap(), Some("k2".to_string()));
    }

    #[tokio::test]
    async fn test_best_credential_none_when_exhausted() {
        let quota = MemoryQuota::new(vec!["k1".to_string(), "k2".to_string()], 5);
        quota.charge("k1", 5).await.unwrap();
        quota.charge("k2", 9).await.unwrap();
        assert_eq!(quota.best_credential().await.unwrap(), None);
    }

    #[test]
    fn test_rollover_expiry_has_margin() {
        let secs = seconds_until_day_rollover();
        assert!(secs > EXPIRY_MARGIN_SECS);
        assert!(secs <= 86_400 + EXPIRY_MARGIN_SECS);
    }
}
