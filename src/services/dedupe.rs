//! Deduplication of verification attempts.
//!
//! Pure reduction over the leads collected for one job: groups attempts by
//! person and selects a single final result per group. No I/O.

use chrono::Utc;
use uuid::Uuid;

use crate::models::lead::{Lead, LeadOutcome};

fn group_key(lead: &Lead) -> (String, String, String) {
    (
        lead.first_name.to_lowercase(),
        lead.last_name.to_lowercase(),
        lead.domain.to_lowercase(),
    )
}

/// Pick the winning attempt for one person: any valid result beats any
/// catchall regardless of score; within a tier the highest prevalence score
/// wins and ties go to the first attempt seen.
fn pick_winner<'a>(attempts: &[&'a Lead]) -> Option<&'a Lead> {
    for tier in [LeadOutcome::Valid, LeadOutcome::Catchall] {
        let mut best: Option<&Lead> = None;
        for lead in attempts {
            if lead.outcome != tier {
                continue;
            }
            match best {
                // Strict comparison keeps the first-seen lead on ties.
                Some(current) if current.score >= lead.score => {}
                _ => best = Some(lead),
            }
        }
        if best.is_some() {
            return best;
        }
    }
    None
}

/// Collapse all attempts for a job into exactly one final result per person,
/// in first-seen group order.
///
/// Winners taken from existing attempts keep their lead id so callers can
/// flag the stored row; groups with no valid or catchall attempt yield a
/// synthetic `not_found` lead with an empty email and zero score.
pub fn select_final_results(leads: &[Lead]) -> Vec<Lead> {
    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut groups: std::collections::HashMap<(String, String, String), Vec<&Lead>> =
        std::collections::HashMap::new();

    for lead in leads {
        let key = group_key(lead);
        let entry = groups.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(lead);
    }

    order
        .into_iter()
        .map(|key| {
            let attempts = &groups[&key];
            match pick_winner(attempts) {
                Some(winner) => {
                    let mut final_lead = winner.clone();
                    final_lead.is_final_result = true;
                    final_lead
                }
                None => not_found_lead(attempts[0]),
            }
        })
        .collect()
}

fn not_found_lead(template: &Lead) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        job_id: template.job_id,
        first_name: template.first_name.clone(),
        last_name: template.last_name.clone(),
        domain: template.domain.clone(),
        company_size: template.company_size.clone(),
        email: String::new(),
        pattern_id: 0,
        score: 0,
        outcome: LeadOutcome::NotFound,
        verification_tag: "dedupe:not_found".to_string(),
        mx_host: None,
        extra: template.extra.clone(),
        is_final_result: true,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(
        first: &str,
        last: &str,
        domain: &str,
        email: &str,
        score: i32,
        outcome: LeadOutcome,
    ) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            job_id: Uuid::nil(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            domain: domain.to_string(),
            company_size: None,
            email: email.to_string(),
            pattern_id: 1,
            score,
            outcome,
            verification_tag: "oracle:primary".to_string(),
            mx_host: None,
            extra: serde_json::Value::Null,
            is_final_result: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_beats_catchall_regardless_of_score() {
        let leads = vec![
            attempt("John", "Doe", "acme.com", "a@acme.com", 10, LeadOutcome::Valid),
            attempt("John", "Doe", "acme.com", "b@acme.com", 40, LeadOutcome::Valid),
            attempt("John", "Doe", "acme.com", "c@acme.com", 99, LeadOutcome::Catchall),
        ];
        let finals = select_final_results(&leads);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].email, "b@acme.com");
        assert_eq!(finals[0].score, 40);
        assert!(finals[0].is_final_result);
    }

    #[test]
    fn test_catchall_when_no_valid() {
        let leads = vec![
            attempt("John", "Doe", "acme.com", "a@acme.com", 10, LeadOutcome::Invalid),
            attempt("John", "Doe", "acme.com", "b@acme.com", 20, LeadOutcome::Catchall),
            attempt("John", "Doe", "acme.com", "c@acme.com", 50, LeadOutcome::Catchall),
        ];
        let finals = select_final_results(&leads);
        assert_eq!(finals[0].email, "c@acme.com");
        assert_eq!(finals[0].outcome, LeadOutcome::Catchall);
    }

    #[test]
    fn test_not_found_when_nothing_deliverable() {
        let leads = vec![
            attempt("John", "Doe", "acme.com", "a@acme.com", 10, LeadOutcome::Invalid),
            attempt("John", "Doe", "acme.com", "b@acme.com", 20, LeadOutcome::Error),
        ];
        let finals = select_final_results(&leads);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].outcome, LeadOutcome::NotFound);
        assert_eq!(finals[0].email, "");
        assert_eq!(finals[0].score, 0);
        assert!(finals[0].is_final_result);
    }

    #[test]
    fn test_score_ties_break_by_input_order() {
        let leads = vec![
            attempt("John", "Doe", "acme.com", "first@acme.com", 40, LeadOutcome::Valid),
            attempt("John", "Doe", "acme.com", "second@acme.com", 40, LeadOutcome::Valid),
        ];
        let finals = select_final_results(&leads);
        assert_eq!(finals[0].email, "first@acme.com");
    }

    #[test]
    fn test_grouping_is_case_insensitive() {
        let leads = vec![
            attempt("John", "Doe", "acme.com", "a@acme.com", 10, LeadOutcome::Invalid),
            attempt("JOHN", "DOE", "Acme.com", "b@acme.com", 20, LeadOutcome::Valid),
        ];
        let finals = select_final_results(&leads);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].email, "b@acme.com");
    }

    #[test]
    fn test_one_final_per_person_in_first_seen_order() {
        let leads = vec![
            attempt("John", "Doe", "acme.com", "a@acme.com", 10, LeadOutcome::Valid),
            attempt("Jane", "Roe", "acme.com", "b@acme.com", 10, LeadOutcome::Invalid),
            attempt("John", "Doe", "acme.com", "c@acme.com", 5, LeadOutcome::Catchall),
            attempt("Jane", "Roe", "acme.com", "d@acme.com", 7, LeadOutcome::Catchall),
        ];
        let finals = select_final_results(&leads);
        assert_eq!(finals.len(), 2);
        assert_eq!(finals[0].email, "a@acme.com");
        assert_eq!(finals[1].email, "d@acme.com");
    }
}
