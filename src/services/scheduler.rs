//! Verification scheduling.
//!
//! Drives candidate verification against the oracle in prevalence-score order,
//! one call at a time, with a minimum inter-call delay that keeps aggregate
//! throughput under the oracle's published rate limit (170 calls / 30s). A
//! transport or oracle error marks that candidate `error` and moves on; quota
//! exhaustion aborts the whole run so callers can tell "nothing left to try"
//! apart from "this check failed".

use std::time::Duration;

use tokio::time::sleep;

use crate::services::oracle::{OracleError, VerifyOracle, VerifyOutcome};
use crate::services::patterns::{self, EmailCandidate, SizeBucket};
use crate::services::quota::{QuotaAllocator, QuotaError};

/// Early-exit policy.
///
/// The default verifies every primary candidate before deduplication.
/// `StopAtFirstValid` is an opt-in fast path; both policies produce the same
/// final result whenever the first valid candidate is also the dedup winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    VerifyAll,
    StopAtFirstValid,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum delay between consecutive oracle calls.
    pub inter_call_delay: Duration,
    pub stop_policy: StopPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            inter_call_delay: Duration::from_millis(200),
            stop_policy: StopPolicy::VerifyAll,
        }
    }
}

/// One attempted candidate with its verification result.
#[derive(Debug, Clone)]
pub struct CandidateAttempt {
    pub email: String,
    pub pattern_id: u16,
    pub score: u16,
    pub outcome: VerifyOutcome,
    pub mx_host: Option<String>,
    /// Provenance: which pool the candidate came from.
    pub tag: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("all verification credentials have exhausted their daily quota")]
    QuotaExhausted,

    #[error("quota accounting failed: {0}")]
    Quota(#[from] QuotaError),
}

/// Verify one person's candidates: the primary pool in score order, then the
/// extended pool if nothing verified as valid or catchall. Returns every
/// attempt made; an empty vec means the inputs could not be enriched.
pub async fn verify_person(
    oracle: &dyn VerifyOracle,
    quota: &dyn QuotaAllocator,
    first_name: &str,
    last_name: &str,
    domain: &str,
    bucket: SizeBucket,
    cfg: &SchedulerConfig,
) -> Result<Vec<CandidateAttempt>, ScheduleError> {
    let primary = patterns::primary_candidates(first_name, last_name, domain, bucket);
    if primary.is_empty() {
        return Ok(Vec::new());
    }

    let mut attempts = run_pass(oracle, quota, &primary, "primary", cfg).await?;

    let any_deliverable = attempts
        .iter()
        .any(|a| matches!(a.outcome, VerifyOutcome::Valid | VerifyOutcome::Catchall));

    if !any_deliverable {
        let extended = patterns::extended_candidates(first_name, last_name, domain, bucket);
        let fallback = run_pass(oracle, quota, &extended, "extended", cfg).await?;
        attempts.extend(fallback);
    }

    Ok(attempts)
}

/// Issue one oracle call per candidate, sequentially, charging the quota
/// allocator for every call made.
async fn run_pass(
    oracle: &dyn VerifyOracle,
    quota: &dyn QuotaAllocator,
    candidates: &[EmailCandidate],
    tag: &str,
    cfg: &SchedulerConfig,
) -> Result<Vec<CandidateAttempt>, ScheduleError> {
    let mut attempts = Vec::with_capacity(candidates.len());

    for (i, candidate) in candidates.iter().enumerate() {
        let credential = quota
            .best_credential()
            .await?
            .ok_or(ScheduleError::QuotaExhausted)?;

        if i > 0 {
            sleep(cfg.inter_call_delay).await;
        }

        let (outcome, mx_host) = match oracle.verify(&candidate.email, &credential).await {
            Ok(v) => (v.outcome, v.mx_host),
            Err(e) => {
                log_oracle_error(&candidate.email, &e);
                (VerifyOutcome::Error, None)
            }
        };

        quota.charge(&credential, 1).await?;
        metrics::counter!("oracle_calls_total").increment(1);

        attempts.push(CandidateAttempt {
            email: candidate.email.clone(),
            pattern_id: candidate.pattern_id,
            score: candidate.score,
            outcome,
            mx_host,
            tag: format!("oracle:{tag}"),
        });

        if cfg.stop_policy == StopPolicy::StopAtFirstValid && outcome == VerifyOutcome::Valid {
            break;
        }
    }

    Ok(attempts)
}

fn log_oracle_error(email: &str, e: &OracleError) {
    tracing::warn!(email, error = %e, "oracle call failed, recording error outcome");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oracle::Verification;
    use crate::services::quota::MemoryQuota;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Oracle stub returning scripted outcomes per email; unknown emails are
    /// invalid. Counts calls.
    struct ScriptedOracle {
        outcomes: HashMap<String, VerifyOutcome>,
        calls: Mutex<Vec<String>>,
        fail_all: bool,
    }

    impl ScriptedOracle {
        fn new(outcomes: &[(&str, VerifyOutcome)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(e, o)| (e.to_string(), *o))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                fail_all: false,
            }
        }

        fn failing() -> Self {
            Self {
                outcomes: HashMap::new(),
                calls: Mutex::new(Vec::new()),
                fail_all: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VerifyOracle for ScriptedOracle {
        async fn verify(
            &self,
            email: &str,
            _credential: &str,
        ) -> Result<Verification, OracleError> {
            self.calls.lock().unwrap().push(email.to_string());
            if self.fail_all {
                return Err(OracleError::Status(503));
            }
            let outcome = self
                .outcomes
                .get(email)
                .copied()
                .unwrap_or(VerifyOutcome::Invalid);
            Ok(Verification {
                outcome,
                mx_host: Some("mx.example.com".to_string()),
            })
        }
    }

    fn fast_cfg() -> SchedulerConfig {
        SchedulerConfig {
            inter_call_delay: Duration::ZERO,
            stop_policy: StopPolicy::VerifyAll,
        }
    }

    #[tokio::test]
    async fn test_verifies_all_primary_candidates() {
        let oracle = ScriptedOracle::new(&[("john.doe@acme.com", VerifyOutcome::Valid)]);
        let quota = MemoryQuota::new(vec!["k1".to_string()], 1000);
        let attempts = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await
        .unwrap();

        assert_eq!(attempts.len(), 16);
        assert_eq!(oracle.call_count(), 16);
        assert_eq!(quota.remaining("k1").await.unwrap(), 1000 - 16);
        assert!(attempts.iter().any(|a| a.outcome == VerifyOutcome::Valid));
    }

    #[tokio::test]
    async fn test_extended_pool_used_when_primary_all_invalid() {
        let oracle = ScriptedOracle::new(&[]);
        let quota = MemoryQuota::new(vec!["k1".to_string()], 1000);
        let attempts = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await
        .unwrap();

        assert_eq!(attempts.len(), 32);
        assert!(attempts.iter().any(|a| a.tag == "oracle:extended"));
    }

    #[tokio::test]
    async fn test_extended_pool_skipped_when_catchall_found() {
        let oracle = ScriptedOracle::new(&[("doe@acme.com", VerifyOutcome::Catchall)]);
        let quota = MemoryQuota::new(vec!["k1".to_string()], 1000);
        let attempts = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await
        .unwrap();

        assert_eq!(attempts.len(), 16);
        assert!(attempts.iter().all(|a| a.tag == "oracle:primary"));
    }

    #[tokio::test]
    async fn test_oracle_errors_do_not_halt_the_pass() {
        let oracle = ScriptedOracle::failing();
        let quota = MemoryQuota::new(vec!["k1".to_string()], 1000);
        let attempts = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await
        .unwrap();

        // Every primary and extended candidate attempted, all recorded as error.
        assert_eq!(attempts.len(), 32);
        assert!(attempts.iter().all(|a| a.outcome == VerifyOutcome::Error));
    }

    #[tokio::test]
    async fn test_fails_fast_on_quota_exhaustion() {
        let oracle = ScriptedOracle::new(&[]);
        let quota = MemoryQuota::new(vec!["k1".to_string()], 5);
        let result = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await;

        assert!(matches!(result, Err(ScheduleError::QuotaExhausted)));
        // Exactly the budgeted calls were issued before failing fast.
        assert_eq!(oracle.call_count(), 5);
    }

    #[tokio::test]
    async fn test_empty_inputs_yield_no_attempts() {
        let oracle = ScriptedOracle::new(&[]);
        let quota = MemoryQuota::new(vec!["k1".to_string()], 1000);
        let attempts = verify_person(
            &oracle,
            &quota,
            "",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await
        .unwrap();
        assert!(attempts.is_empty());
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_at_first_valid_matches_verify_all_winner() {
        // The top-scoring candidate is valid, so both policies must agree.
        let script = [("john.doe@acme.com", VerifyOutcome::Valid)];
        let quota = MemoryQuota::new(vec!["k1".to_string()], 1000);

        let oracle = ScriptedOracle::new(&script);
        let all = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &fast_cfg(),
        )
        .await
        .unwrap();

        let oracle = ScriptedOracle::new(&script);
        let fast = verify_person(
            &oracle,
            &quota,
            "John",
            "Doe",
            "acme.com",
            SizeBucket::Default,
            &SchedulerConfig {
                inter_call_delay: Duration::ZERO,
                stop_policy: StopPolicy::StopAtFirstValid,
            },
        )
        .await
        .unwrap();

        assert_eq!(fast.len(), 1);
        let best_all = all
            .iter()
            .filter(|a| a.outcome == VerifyOutcome::Valid)
            .max_by_key(|a| a.score)
            .unwrap();
        assert_eq!(fast[0].email, best_all.email);
    }
}
