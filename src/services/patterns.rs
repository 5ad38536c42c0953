//! Email candidate generation.
//!
//! Turns a (first name, last name, domain) triple into a ranked list of
//! candidate addresses. Each candidate carries a pattern id and a prevalence
//! score looked up from a static table keyed by (pattern, company-size bucket).
//! The primary pool (ids 1-16) is verified first; the extended pool (ids 17-32)
//! is a lower-prevalence fallback used only when nothing in the primary pool
//! verified as valid or catchall.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A single candidate address with its ranking inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailCandidate {
    pub email: String,
    pub pattern_id: u16,
    pub score: u16,
}

/// Company-size bucket used to select a prevalence column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBucket {
    /// 1-50 employees
    Micro,
    /// 51-200 employees
    Small,
    /// 201-500 employees
    Medium,
    /// 500+ employees
    Large,
    /// Unknown or unparseable size descriptor
    Default,
}

impl SizeBucket {
    fn column(&self) -> usize {
        match self {
            SizeBucket::Micro => 0,
            SizeBucket::Small => 1,
            SizeBucket::Medium => 2,
            SizeBucket::Large => 3,
            SizeBucket::Default => 4,
        }
    }

    fn from_employee_count(n: u32) -> SizeBucket {
        match n {
            0 => SizeBucket::Default,
            1..=50 => SizeBucket::Micro,
            51..=200 => SizeBucket::Small,
            201..=500 => SizeBucket::Medium,
            _ => SizeBucket::Large,
        }
    }
}

/// Parse a free-text company-size descriptor into a bucket.
///
/// Tries an explicit range match first ("51-200 employees"), then maps the
/// first embedded integer into a bucket, and otherwise falls back to
/// [`SizeBucket::Default`].
pub fn parse_size_bucket(descriptor: Option<&str>) -> SizeBucket {
    let text = match descriptor {
        Some(t) if !t.trim().is_empty() => t.trim(),
        _ => return SizeBucket::Default,
    };

    // Longest needles first: "201-500" and "501-1000" both contain "1-50" as
    // a substring, so the narrower ranges must never be checked before them.
    for (needle, bucket) in [
        ("501-1000", SizeBucket::Large),
        ("201-500", SizeBucket::Medium),
        ("51-200", SizeBucket::Small),
        ("1000+", SizeBucket::Large),
        ("500+", SizeBucket::Large),
        ("1-50", SizeBucket::Micro),
    ] {
        if text.contains(needle) {
            return bucket;
        }
    }

    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    match digits.parse::<u32>() {
        Ok(n) => SizeBucket::from_employee_count(n),
        Err(_) => SizeBucket::Default,
    }
}

/// Trim a trailing single-letter "middle initial" token from a display name.
///
/// `"Chelsey n."` becomes `"Chelsey"`; hyphenated or single-token names pass
/// through unchanged. Case is preserved.
pub fn clean_name(raw: &str) -> String {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() >= 2 {
        let last = tokens[tokens.len() - 1];
        let stripped = last.strip_suffix('.').unwrap_or(last);
        if stripped.chars().count() == 1
            && stripped.chars().all(|c| c.is_alphabetic())
        {
            return tokens[..tokens.len() - 1].join(" ");
        }
    }
    tokens.join(" ")
}

/// Fold a cleaned name into an email local-part fragment: strip diacritics,
/// lowercase, keep only alphanumerics and hyphens.
pub fn fold_local_part(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// Normalize a company domain: strip scheme, `www.`, and any path; lowercase.
pub fn normalize_domain(raw: &str) -> String {
    let mut d = raw.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = d.strip_prefix(scheme) {
            d = rest.to_string();
            break;
        }
    }
    if let Some(rest) = d.strip_prefix("www.") {
        d = rest.to_string();
    }
    if let Some(idx) = d.find('/') {
        d.truncate(idx);
    }
    d.trim_matches('.').to_string()
}

/// Prevalence scores per primary pattern, one column per size bucket
/// (micro, small, medium, large, default). Derived from observed pattern
/// frequency: small shops favor `first@`, larger companies `first.last@`.
const PRIMARY_SCORES: [[u16; 5]; PRIMARY_PATTERN_COUNT] = [
    [64, 74, 78, 80, 72], // 1  first.last
    [78, 52, 30, 18, 48], // 2  first
    [40, 42, 40, 36, 40], // 3  firstlast
    [34, 44, 52, 58, 46], // 4  flast
    [22, 26, 30, 34, 28], // 5  first.l
    [30, 22, 14, 8, 18],  // 6  last
    [18, 22, 26, 28, 24], // 7  firstl
    [12, 14, 18, 22, 16], // 8  last.first
    [16, 20, 24, 28, 22], // 9  f.last
    [10, 11, 12, 14, 12], // 10 lastfirst
    [14, 15, 16, 17, 15], // 11 first_last
    [8, 9, 10, 12, 10],   // 12 fl
    [6, 7, 8, 9, 8],      // 13 first-last
    [5, 5, 6, 6, 5],      // 14 lastf
    [4, 4, 5, 5, 4],      // 15 last.f
    [3, 3, 3, 4, 3],      // 16 l.first
];

const PRIMARY_PATTERN_COUNT: usize = 16;
const EXTENDED_PATTERN_COUNT: usize = 16;

/// Verification order of the extended pool per size bucket. Each row is a
/// permutation of pattern ids 17-32.
const EXTENDED_ORDER: [[u16; EXTENDED_PATTERN_COUNT]; 5] = [
    // micro: short informal variants first
    [32, 23, 17, 18, 21, 22, 24, 27, 19, 20, 25, 26, 28, 29, 30, 31],
    // small
    [17, 23, 21, 18, 22, 32, 19, 24, 27, 20, 25, 26, 28, 30, 29, 31],
    // medium
    [17, 18, 19, 23, 21, 22, 20, 24, 25, 27, 26, 30, 28, 31, 29, 32],
    // large: separator-heavy corporate variants first
    [17, 19, 18, 20, 21, 25, 22, 26, 30, 31, 23, 24, 27, 28, 29, 32],
    // default
    [17, 18, 21, 23, 19, 22, 32, 20, 24, 25, 27, 26, 30, 28, 31, 29],
];

/// Render the local part for a pattern id. `first` and `last` must already be
/// folded via [`fold_local_part`] and non-empty.
fn local_part(pattern_id: u16, first: &str, last: &str) -> String {
    let f = &first[..first.char_indices().nth(1).map(|(i, _)| i).unwrap_or(first.len())];
    let l = &last[..last.char_indices().nth(1).map(|(i, _)| i).unwrap_or(last.len())];
    match pattern_id {
        1 => format!("{first}.{last}"),
        2 => first.to_string(),
        3 => format!("{first}{last}"),
        4 => format!("{f}{last}"),
        5 => format!("{first}.{l}"),
        6 => last.to_string(),
        7 => format!("{first}{l}"),
        8 => format!("{last}.{first}"),
        9 => format!("{f}.{last}"),
        10 => format!("{last}{first}"),
        11 => format!("{first}_{last}"),
        12 => format!("{f}{l}"),
        13 => format!("{first}-{last}"),
        14 => format!("{last}{f}"),
        15 => format!("{last}.{f}"),
        16 => format!("{l}.{first}"),
        17 => format!("{f}_{last}"),
        18 => format!("{f}-{last}"),
        19 => format!("{last}_{first}"),
        20 => format!("{last}-{first}"),
        21 => format!("{first}_{l}"),
        22 => format!("{first}-{l}"),
        23 => {
            let three: String = first.chars().take(3).collect();
            format!("{three}{last}")
        }
        24 => format!("{l}{first}"),
        25 => format!("{l}_{first}"),
        26 => format!("{l}-{first}"),
        27 => format!("{f}.{l}"),
        28 => format!("{f}_{l}"),
        29 => format!("{f}-{l}"),
        30 => format!("{last}_{f}"),
        31 => format!("{last}-{f}"),
        32 => f.to_string(),
        _ => unreachable!("unknown pattern id {pattern_id}"),
    }
}

fn normalize_inputs(first_name: &str, last_name: &str, domain: &str) -> Option<(String, String, String)> {
    let first = fold_local_part(&clean_name(first_name));
    let last = fold_local_part(&clean_name(last_name));
    let domain = normalize_domain(domain);
    if first.is_empty() || last.is_empty() || domain.is_empty() {
        // Cannot enrich; callers must not treat this as an error.
        return None;
    }
    Some((first, last, domain))
}

/// Generate the 16 primary candidates, sorted by non-increasing prevalence
/// score. Ties keep table-definition order (the sort is stable). Returns an
/// empty list when any input normalizes to empty.
pub fn primary_candidates(
    first_name: &str,
    last_name: &str,
    domain: &str,
    bucket: SizeBucket,
) -> Vec<EmailCandidate> {
    let (first, last, domain) = match normalize_inputs(first_name, last_name, domain) {
        Some(parts) => parts,
        None => return Vec::new(),
    };

    let col = bucket.column();
    let mut candidates: Vec<EmailCandidate> = (0..PRIMARY_PATTERN_COUNT)
        .map(|i| {
            let pattern_id = (i + 1) as u16;
            EmailCandidate {
                email: format!("{}@{}", local_part(pattern_id, &first, &last), domain),
                pattern_id,
                score: PRIMARY_SCORES[i][col],
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

/// Generate the 16 extended fallback candidates (ids 17-32) in the fixed
/// order defined for the size bucket. Scores descend with position and sit
/// below the bulk of the primary table.
pub fn extended_candidates(
    first_name: &str,
    last_name: &str,
    domain: &str,
    bucket: SizeBucket,
) -> Vec<EmailCandidate> {
    let (first, last, domain) = match normalize_inputs(first_name, last_name, domain) {
        Some(parts) => parts,
        None => return Vec::new(),
    };

    EXTENDED_ORDER[bucket.column()]
        .iter()
        .enumerate()
        .map(|(i, &pattern_id)| EmailCandidate {
            email: format!("{}@{}", local_part(pattern_id, &first, &last), domain),
            pattern_id,
            score: (EXTENDED_PATTERN_COUNT - i) as u16,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_count_and_order() {
        let candidates = primary_candidates("John", "Doe", "example.com", SizeBucket::Default);
        assert_eq!(candidates.len(), 16);
        for pair in candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score, "scores must be non-increasing");
        }
        // first.last leads for the default bucket
        assert_eq!(candidates[0].email, "john.doe@example.com");
        assert_eq!(candidates[0].pattern_id, 1);
    }

    #[test]
    fn test_micro_bucket_prefers_bare_first_name() {
        let candidates = primary_candidates("John", "Doe", "example.com", SizeBucket::Micro);
        assert_eq!(candidates[0].email, "john@example.com");
    }

    #[test]
    fn test_empty_inputs_produce_no_candidates() {
        assert!(primary_candidates("", "Doe", "example.com", SizeBucket::Default).is_empty());
        assert!(primary_candidates("John", "", "example.com", SizeBucket::Default).is_empty());
        assert!(primary_candidates("John", "Doe", "", SizeBucket::Default).is_empty());
        assert!(primary_candidates("$%^", "Doe", "example.com", SizeBucket::Default).is_empty());
        assert!(extended_candidates("", "Doe", "example.com", SizeBucket::Default).is_empty());
    }

    #[test]
    fn test_clean_name_trims_middle_initial() {
        assert_eq!(clean_name("Chelsey n."), "Chelsey");
        assert_eq!(clean_name("Chelsey N"), "Chelsey");
        assert_eq!(clean_name("Mary-Anne"), "Mary-Anne");
        assert_eq!(clean_name(""), "");
        // A bare initial with no preceding token is kept
        assert_eq!(clean_name("J."), "J.");
    }

    #[test]
    fn test_fold_local_part_strips_diacritics() {
        assert_eq!(fold_local_part("José"), "jose");
        assert_eq!(fold_local_part("Müller"), "muller");
        assert_eq!(fold_local_part("Mary-Anne"), "mary-anne");
        assert_eq!(fold_local_part("O'Brien"), "obrien");
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("https://www.Acme.com/careers"), "acme.com");
        assert_eq!(normalize_domain("http://acme.com"), "acme.com");
        assert_eq!(normalize_domain("acme.com/"), "acme.com");
        assert_eq!(normalize_domain("  ACME.COM  "), "acme.com");
    }

    #[test]
    fn test_parse_size_bucket() {
        assert_eq!(parse_size_bucket(Some("1-50 employees")), SizeBucket::Micro);
        assert_eq!(parse_size_bucket(Some("51-200")), SizeBucket::Small);
        assert_eq!(parse_size_bucket(Some("201-500 people")), SizeBucket::Medium);
        assert_eq!(parse_size_bucket(Some("501-1000 employees")), SizeBucket::Large);
        assert_eq!(parse_size_bucket(Some("1000+")), SizeBucket::Large);
        assert_eq!(parse_size_bucket(Some("500+")), SizeBucket::Large);
        assert_eq!(parse_size_bucket(Some("about 120 staff")), SizeBucket::Small);
        assert_eq!(parse_size_bucket(Some("3000")), SizeBucket::Large);
        assert_eq!(parse_size_bucket(Some("startup")), SizeBucket::Default);
        assert_eq!(parse_size_bucket(None), SizeBucket::Default);
    }

    #[test]
    fn test_extended_pool_is_distinct_from_primary() {
        let primary = primary_candidates("Jane", "Smith", "acme.com", SizeBucket::Large);
        let extended = extended_candidates("Jane", "Smith", "acme.com", SizeBucket::Large);
        assert_eq!(extended.len(), 16);
        for c in &extended {
            assert!(c.pattern_id >= 17 && c.pattern_id <= 32);
            assert!(primary.iter().all(|p| p.pattern_id != c.pattern_id));
        }
        for pair in extended.windows(2) {
            assert!(pair[0].score > pair[1].score);
        }
    }

    #[test]
    fn test_extended_order_varies_by_bucket() {
        let micro = extended_candidates("Jane", "Smith", "acme.com", SizeBucket::Micro);
        let large = extended_candidates("Jane", "Smith", "acme.com", SizeBucket::Large);
        assert_ne!(
            micro.iter().map(|c| c.pattern_id).collect::<Vec<_>>(),
            large.iter().map(|c| c.pattern_id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_name_with_trailing_initial_generates_clean_candidates() {
        let candidates = primary_candidates("Chelsey n.", "Walker", "acme.com", SizeBucket::Default);
        assert_eq!(candidates[0].email, "chelsey.walker@acme.com");
    }
}
