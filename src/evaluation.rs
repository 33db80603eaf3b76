//! Scoring of linkage output against ground truth.
//!
//! Pairs that classify as [`LinkStatus::Unknown`] or
//! [`LinkStatus::Excluded`] never enter the confusion counts; linkage over
//! partially annotated vital records would otherwise punish the linker for
//! the dataset's gaps.

use crate::config::{CancelToken, LinkageConfig};
use crate::error::{Error, Result};
use crate::ground_truth::{GroundTruthClassifier, LinkStatus};
use crate::linker::Link;
use crate::record::{RecordId, VitalRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Linkage quality
// ============================================================================

/// Confusion counts and derived quality metrics for one linkage run.
///
/// `false_negatives` is derived from the total number of true-match pairs in
/// the dataset, which the caller obtains from [`count_true_links`] or
/// external knowledge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkageQuality {
    /// Emitted links whose pair is a ground-truth match.
    pub true_positives: usize,
    /// Emitted links whose pair is a ground-truth non-match.
    pub false_positives: usize,
    /// Ground-truth matches the linker failed to emit.
    pub false_negatives: usize,
    /// Links whose pair classified as unknown; reported, not scored.
    pub unknown: usize,
    /// Links whose pair classified as excluded; reported, not scored.
    pub excluded: usize,
}

impl LinkageQuality {
    /// Fraction of emitted links that are true matches.
    ///
    /// Returns 0.0 when no links were scored.
    #[must_use]
    pub fn precision(&self) -> f64 {
        let emitted = self.true_positives + self.false_positives;
        if emitted == 0 {
            0.0
        } else {
            self.true_positives as f64 / emitted as f64
        }
    }

    /// Fraction of true-match pairs that were found.
    ///
    /// Returns 0.0 when the dataset holds no true matches.
    #[must_use]
    pub fn recall(&self) -> f64 {
        let actual = self.true_positives + self.false_negatives;
        if actual == 0 {
            0.0
        } else {
            self.true_positives as f64 / actual as f64
        }
    }

    /// Harmonic mean of precision and recall; 0.0 when both are zero.
    #[must_use]
    pub fn f_measure(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

impl fmt::Display for LinkageQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tp={} fp={} fn={} unknown={} excluded={} | precision={:.4} recall={:.4} f={:.4}",
            self.true_positives,
            self.false_positives,
            self.false_negatives,
            self.unknown,
            self.excluded,
            self.precision(),
            self.recall(),
            self.f_measure()
        )
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Keep only the best link per query endpoint.
///
/// Threshold linkage can emit several stored candidates for one query
/// record; identity linkage wants exactly one. Minimum distance wins, and
/// the first-encountered link wins distance ties. The query endpoint is
/// `record_b`, matching the linker's index-backed orientation.
#[must_use]
pub fn best_link_per_query<R: VitalRecord>(links: &[Link<R>]) -> Vec<Link<R>> {
    let mut best: HashMap<RecordId, &Link<R>> = HashMap::new();
    let mut order: Vec<RecordId> = Vec::new();

    for link in links {
        let query = link.record_b.id();
        match best.get(&query) {
            Some(current) if current.distance <= link.distance => {}
            Some(_) => {
                best.insert(query, link);
            }
            None => {
                best.insert(query, link);
                order.push(query);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| best.get(&id).map(|l| (*l).clone()))
        .collect()
}

/// Score a set of emitted links against a classifier.
///
/// `total_true_matches` is the number of true-match pairs in the whole
/// dataset; false negatives are the ones the linker missed. Passing the
/// count of true matches *among the emitted links* would make recall
/// trivially 1.0, so callers must count over the candidate space instead.
pub fn evaluate_links<R: VitalRecord>(
    links: &[Link<R>],
    classifier: &GroundTruthClassifier,
    total_true_matches: usize,
) -> LinkageQuality {
    let mut quality = LinkageQuality::default();

    for link in links {
        match classifier.classify(link.record_a.as_ref(), link.record_b.as_ref()) {
            LinkStatus::TrueMatch => quality.true_positives += 1,
            LinkStatus::NotTrueMatch => quality.false_positives += 1,
            LinkStatus::Unknown => quality.unknown += 1,
            LinkStatus::Excluded => quality.excluded += 1,
        }
    }

    quality.false_negatives = total_true_matches.saturating_sub(quality.true_positives);

    log::info!("linkage evaluation: {quality}");
    quality
}

/// Count true-match pairs over the cross product of a record collection.
///
/// Each unordered pair is counted once; self pairs are skipped. Quadratic,
/// so the sweep polls the cancel token at the configured interval.
pub fn count_true_links<R: VitalRecord>(
    records: &[Arc<R>],
    classifier: &GroundTruthClassifier,
    config: &LinkageConfig,
    cancel: &CancelToken,
) -> Result<usize> {
    let mut count = 0;
    let mut comparisons: u64 = 0;

    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            comparisons += 1;
            if comparisons % config.cancel_check_interval == 0 && cancel.is_cancelled() {
                return Err(Error::Cancelled { comparisons });
            }
            if classifier.classify(a.as_ref(), b.as_ref()) == LinkStatus::TrueMatch {
                count += 1;
            }
        }
    }
    Ok(count)
}

// ============================================================================
// Threshold sweep
// ============================================================================

/// Quality re-scored at one candidate threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPoint {
    /// Candidate linking threshold.
    pub threshold: f64,
    /// Quality of the link set filtered to this threshold.
    pub quality: LinkageQuality,
}

/// Re-score one over-generated link set at each candidate threshold.
///
/// The links must have been produced at a threshold at least as large as
/// every candidate; filtering a link set below its producing threshold is
/// sound, widening it is not.
pub fn sweep_thresholds<R: VitalRecord>(
    links: &[Link<R>],
    classifier: &GroundTruthClassifier,
    total_true_matches: usize,
    thresholds: &[f64],
) -> Vec<ThresholdPoint> {
    thresholds
        .iter()
        .map(|&threshold| {
            let retained: Vec<Link<R>> = links
                .iter()
                .filter(|l| l.distance <= threshold)
                .cloned()
                .collect();
            ThresholdPoint {
                threshold,
                quality: evaluate_links(&retained, classifier, total_true_matches),
            }
        })
        .collect()
}

/// The sweep point with the highest F-measure, ties broken by the lower
/// threshold. `None` on an empty sweep.
#[must_use]
pub fn best_by_f_measure(points: &[ThresholdPoint]) -> Option<&ThresholdPoint> {
    points.iter().reduce(|best, p| {
        let (fb, fp) = (best.quality.f_measure(), p.quality.f_measure());
        if fp > fb || (fp == fb && p.threshold < best.threshold) {
            p
        } else {
            best
        }
    })
}
