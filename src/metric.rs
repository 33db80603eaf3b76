//! Field-level string distance metrics.
//!
//! A [`FieldMetric`] turns two field values into a non-negative distance.
//! Metrics declaring [`FieldMetric::is_true_metric`] additionally guarantee
//! identity of indiscernibles, symmetry, and the triangle inequality —
//! candidate search structures rely on the triangle inequality for pruning,
//! so a false claim silently corrupts range-query results. Use
//! [`validate_triangle_inequality`] to check a metric against sampled values.

use crate::config::{CancelToken, LinkageConfig};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// A pluggable string distance function.
///
/// Implementations must be pure: the same inputs always produce the same
/// distance, with no interior mutability, so one instance can be shared
/// across worker threads.
pub trait FieldMetric: Send + Sync {
    /// Distance between two field values. Always `>= 0`.
    fn distance(&self, a: &str, b: &str) -> f64;

    /// Human-readable metric name.
    fn name(&self) -> &'static str;

    /// Whether this metric satisfies the true-metric laws.
    fn is_true_metric(&self) -> bool;

    /// Whether distances are bounded by 1.
    ///
    /// Composite normalization is a no-op for bounded metrics, and the
    /// Fellegi–Sunter measure requires one.
    fn max_distance_is_one(&self) -> bool;
}

// =============================================================================
// Levenshtein
// =============================================================================

/// Levenshtein edit distance. Unbounded; a true metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl FieldMetric for Levenshtein {
    fn distance(&self, a: &str, b: &str) -> f64 {
        levenshtein(a, b) as f64
    }

    fn name(&self) -> &'static str {
        "levenshtein"
    }

    fn is_true_metric(&self) -> bool {
        true
    }

    fn max_distance_is_one(&self) -> bool {
        false
    }
}

/// Edit distance over Unicode scalar values, two-row dynamic program.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// =============================================================================
// Bigram Jaccard
// =============================================================================

/// Jaccard distance over character-bigram sets. Bounded by 1.
///
/// `1 - |A ∩ B| / |A ∪ B|` where A, B are the bigram sets of the two values.
/// Strings shorter than two characters contribute the whole string as a
/// single token, so one-letter names still compare.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigramJaccard;

impl BigramJaccard {
    fn bigrams(s: &str) -> HashSet<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 2 {
            return chars.first().map(|&c| (c, '\0')).into_iter().collect();
        }
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

impl FieldMetric for BigramJaccard {
    fn distance(&self, a: &str, b: &str) -> f64 {
        let set_a = Self::bigrams(a);
        let set_b = Self::bigrams(b);

        let union = set_a.union(&set_b).count();
        if union == 0 {
            return 0.0; // both empty
        }
        let intersection = set_a.intersection(&set_b).count();
        1.0 - intersection as f64 / union as f64
    }

    fn name(&self) -> &'static str {
        "bigram-jaccard"
    }

    fn is_true_metric(&self) -> bool {
        true
    }

    fn max_distance_is_one(&self) -> bool {
        true
    }
}

/// Jaccard distance between two id sets.
///
/// Shared with the consistency resolver, which compares sibling-neighbour
/// sets rather than strings.
#[must_use]
pub fn jaccard_distance_sets<T: std::hash::Hash + Eq>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    1.0 - intersection as f64 / union as f64
}

// =============================================================================
// Jensen–Shannon
// =============================================================================

/// Jensen–Shannon distance over character distributions. Bounded by 1.
///
/// Square root of the Jensen–Shannon divergence (log base 2), which is a true
/// metric. Distributions are unigram character frequencies of each value.
#[derive(Debug, Clone, Copy, Default)]
pub struct JensenShannon;

impl JensenShannon {
    fn distribution(s: &str) -> HashMap<char, f64> {
        let mut counts: HashMap<char, f64> = HashMap::new();
        let mut total = 0.0;
        for c in s.chars() {
            *counts.entry(c).or_insert(0.0) += 1.0;
            total += 1.0;
        }
        if total > 0.0 {
            for v in counts.values_mut() {
                *v /= total;
            }
        }
        counts
    }
}

impl FieldMetric for JensenShannon {
    fn distance(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 0.0;
        }

        let p = Self::distribution(a);
        let q = Self::distribution(b);
        if p.is_empty() && q.is_empty() {
            return 0.0;
        }
        if p.is_empty() || q.is_empty() {
            return 1.0;
        }

        let keys: HashSet<&char> = p.keys().chain(q.keys()).collect();
        let mut divergence = 0.0;
        for key in keys {
            let pi = p.get(key).copied().unwrap_or(0.0);
            let qi = q.get(key).copied().unwrap_or(0.0);
            let mi = (pi + qi) / 2.0;
            if pi > 0.0 {
                divergence += 0.5 * pi * (pi / mi).log2();
            }
            if qi > 0.0 {
                divergence += 0.5 * qi * (qi / mi).log2();
            }
        }

        // Floating-point noise can push the divergence a hair outside [0, 1].
        divergence.clamp(0.0, 1.0).sqrt()
    }

    fn name(&self) -> &'static str {
        "jensen-shannon"
    }

    fn is_true_metric(&self) -> bool {
        true
    }

    fn max_distance_is_one(&self) -> bool {
        true
    }
}

// =============================================================================
// Triangle-inequality validation
// =============================================================================

/// A sampled triple violating the triangle inequality.
#[derive(Debug, Clone)]
pub struct TriangleViolation {
    /// The three offending values, ordered (a, b, c).
    pub values: (String, String, String),
    /// `distance(a, c)`.
    pub direct: f64,
    /// `distance(a, b) + distance(b, c)`.
    pub via: f64,
}

/// Check `distance(a,c) <= distance(a,b) + distance(b,c) + epsilon` for every
/// triple of the sampled values.
///
/// Cubic in the sample count; the cancel token is polled every
/// [`LinkageConfig::cancel_check_interval`] comparisons. Violations are
/// returned with the offending triples, never just a count.
pub fn validate_triangle_inequality(
    metric: &dyn FieldMetric,
    samples: &[&str],
    epsilon: f64,
    config: &LinkageConfig,
    cancel: &CancelToken,
) -> Result<Vec<TriangleViolation>> {
    let mut violations = Vec::new();
    let mut comparisons: u64 = 0;

    for &a in samples {
        for &b in samples {
            for &c in samples {
                comparisons += 1;
                if comparisons % config.cancel_check_interval == 0 && cancel.is_cancelled() {
                    return Err(Error::Cancelled { comparisons });
                }

                let direct = metric.distance(a, c);
                let via = metric.distance(a, b) + metric.distance(b, c);
                if direct > via + epsilon {
                    violations.push(TriangleViolation {
                        values: (a.to_string(), b.to_string(), c.to_string()),
                        direct,
                        via,
                    });
                }
            }
        }
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        let m = Levenshtein;
        assert_eq!(m.distance("kitten", "sitting"), 3.0);
        assert_eq!(m.distance("", "abc"), 3.0);
        assert_eq!(m.distance("same", "same"), 0.0);
    }

    #[test]
    fn test_bigram_jaccard_bounds() {
        let m = BigramJaccard;
        assert_eq!(m.distance("", ""), 0.0);
        assert_eq!(m.distance("anna", "anna"), 0.0);
        assert_eq!(m.distance("abc", "xyz"), 1.0);

        let d = m.distance("johan", "johann");
        assert!(d > 0.0 && d < 1.0);
    }

    #[test]
    fn test_jensen_shannon_bounds() {
        let m = JensenShannon;
        assert_eq!(m.distance("", ""), 0.0);
        assert_eq!(m.distance("anna", "anna"), 0.0);
        assert_eq!(m.distance("a", ""), 1.0);

        let d = m.distance("maria", "marja");
        assert!(d > 0.0 && d < 1.0);
    }

    #[test]
    fn test_jaccard_distance_sets() {
        let a: HashSet<u64> = [1, 2, 3].into_iter().collect();
        let b: HashSet<u64> = [2, 3, 4].into_iter().collect();
        let d = jaccard_distance_sets(&a, &b);
        assert!((d - 0.5).abs() < 1e-10); // 2 shared / 4 union

        let empty: HashSet<u64> = HashSet::new();
        assert_eq!(jaccard_distance_sets(&empty, &empty), 0.0);
    }

    #[test]
    fn test_triangle_validation_passes_for_levenshtein() {
        let samples = ["anna", "anne", "johan", "", "jon", "maria"];
        let violations = validate_triangle_inequality(
            &Levenshtein,
            &samples,
            1e-9,
            &LinkageConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_triangle_validation_cancellation() {
        let config = LinkageConfig {
            cancel_check_interval: 1,
            ..LinkageConfig::default()
        };
        let cancel = CancelToken::new();
        cancel.cancel();

        let samples = ["a", "b", "c"];
        let result =
            validate_triangle_inequality(&Levenshtein, &samples, 1e-9, &config, &cancel);
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn levenshtein_symmetric(a in "[a-zåäö]{0,12}", b in "[a-zåäö]{0,12}") {
            let m = Levenshtein;
            prop_assert_eq!(m.distance(&a, &b), m.distance(&b, &a));
        }

        #[test]
        fn levenshtein_identity(a in "[a-zåäö]{0,12}") {
            prop_assert_eq!(Levenshtein.distance(&a, &a), 0.0);
        }

        #[test]
        fn bounded_metrics_stay_in_unit_interval(a in "[a-z]{0,10}", b in "[a-z]{0,10}") {
            for metric in [&BigramJaccard as &dyn FieldMetric, &JensenShannon] {
                let d = metric.distance(&a, &b);
                prop_assert!(d >= 0.0);
                prop_assert!(d <= 1.0 + 1e-12);
            }
        }

        #[test]
        fn triangle_inequality_holds(
            a in "[a-z]{0,8}",
            b in "[a-z]{0,8}",
            c in "[a-z]{0,8}",
        ) {
            for metric in [
                &Levenshtein as &dyn FieldMetric,
                &BigramJaccard,
                &JensenShannon,
            ] {
                let direct = metric.distance(&a, &c);
                let via = metric.distance(&a, &b) + metric.distance(&b, &c);
                prop_assert!(direct <= via + 1e-9, "{} violated triangle", metric.name());
            }
        }
    }
}
