//! Name matcher.
//!
//! Compares column names after normalization (lower-case, alphanumerics
//! only). The similarity ratio is `2 * LCS / (len_a + len_b)` over the
//! normalized characters, so it lies in `[0, 1]` and is 1 only for equal
//! strings.

/// Minimum ratio for [`best_match`] to report a candidate.
pub const MATCH_THRESHOLD: f64 = 0.82;

pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Similarity of two names in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();
    ratio(&a, &b)
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(a, b)) as f64 / total as f64
}

/// Longest common subsequence length, two DP rows.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Best candidate for `name` with its score, or `("", 0.0)`.
///
/// A normalized exact match wins immediately with 1.0. Otherwise the
/// highest ratio at or above `threshold` wins; ties keep the earlier
/// candidate.
pub fn best_match_with<S: AsRef<str>>(name: &str, candidates: &[S], threshold: f64) -> (String, f64) {
    let needle: Vec<char> = normalize(name).chars().collect();
    if needle.is_empty() {
        return (String::new(), 0.0);
    }

    let mut best: Option<(&str, f64)> = None;
    for cand in candidates {
        let cand = cand.as_ref();
        let chars: Vec<char> = normalize(cand).chars().collect();
        if chars == needle {
            return (cand.to_string(), 1.0);
        }
        let score = ratio(&needle, &chars);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((cand, score));
        }
    }

    match best {
        Some((cand, score)) if score >= threshold => (cand.to_string(), score),
        _ => (String::new(), 0.0),
    }
}

pub fn best_match<S: AsRef<str>>(name: &str, candidates: &[S]) -> (String, f64) {
    best_match_with(name, candidates, MATCH_THRESHOLD)
}
