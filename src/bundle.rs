//! Sibling family bundling.
//!
//! Each record anchors a candidate family: itself plus every record it holds
//! a sibling link to. Bundles built from a consistent link set collapse into
//! one bundle per family; bundles that only partially overlap witness a
//! linkage conflict and are flagged rather than force-merged.

use crate::linker::Link;
use crate::record::{RecordId, VitalRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A candidate family: the anchor record and its linked siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyBundle {
    /// Sibling record ids, anchor included.
    pub members: BTreeSet<RecordId>,
}

impl FamilyBundle {
    #[must_use]
    pub fn new(members: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.members.contains(&id)
    }
}

/// Two surviving bundles that overlap without either containing the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapFlag {
    /// One of the contested bundles.
    pub left: FamilyBundle,
    /// The other contested bundle.
    pub right: FamilyBundle,
    /// Records claimed by both.
    pub shared: BTreeSet<RecordId>,
}

/// Result of one bundling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOutcome {
    /// Surviving bundles after reconciliation.
    pub bundles: Vec<FamilyBundle>,
    /// Partial overlaps left unresolved; family membership is contested.
    pub flagged: Vec<OverlapFlag>,
    /// False when the iteration cap was hit before reconciliation settled.
    pub reached_fixed_point: bool,
    /// Reconciliation passes performed.
    pub iterations: usize,
}

/// Merges per-record family bundles to a fixed point.
#[derive(Debug, Clone)]
pub struct FamilyBundleMerger {
    max_iterations: usize,
}

impl Default for FamilyBundleMerger {
    fn default() -> Self {
        Self { max_iterations: 20 }
    }
}

impl FamilyBundleMerger {
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    /// Bundle the endpoints of a sibling link set.
    pub fn bundle<R: VitalRecord>(&self, links: &[Link<R>]) -> BundleOutcome {
        let mut anchors: BTreeSet<RecordId> = BTreeSet::new();
        for link in links {
            anchors.insert(link.record_a.id());
            anchors.insert(link.record_b.id());
        }

        let initial: Vec<FamilyBundle> = anchors
            .iter()
            .map(|&anchor| {
                let mut members: BTreeSet<RecordId> = links
                    .iter()
                    .filter_map(|l| {
                        let (a, b) = (l.record_a.id(), l.record_b.id());
                        if a == anchor {
                            Some(b)
                        } else if b == anchor {
                            Some(a)
                        } else {
                            None
                        }
                    })
                    .collect();
                members.insert(anchor);
                FamilyBundle { members }
            })
            .collect();

        self.reconcile(initial)
    }

    /// Pairwise reconciliation to a fixed point or the iteration cap.
    ///
    /// Identical bundles merge; a strict subset is absorbed by its superset;
    /// partial overlaps stay distinct and are flagged at the end.
    pub fn reconcile(&self, mut bundles: Vec<FamilyBundle>) -> BundleOutcome {
        bundles.retain(|b| !b.is_empty());

        let mut iterations = 0;
        let mut reached_fixed_point = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let mut changed = false;
            let mut merged: Vec<FamilyBundle> = Vec::with_capacity(bundles.len());

            'outer: for bundle in bundles {
                for kept in &mut merged {
                    if bundle.members.is_subset(&kept.members) {
                        // Identical or absorbed.
                        changed = true;
                        continue 'outer;
                    }
                    if kept.members.is_subset(&bundle.members) {
                        *kept = bundle;
                        changed = true;
                        continue 'outer;
                    }
                }
                merged.push(bundle);
            }

            bundles = merged;
            if !changed {
                reached_fixed_point = true;
                break;
            }
        }

        let flagged = partial_overlaps(&bundles);
        if !flagged.is_empty() {
            log::warn!("{} contested family overlaps after bundling", flagged.len());
        }
        if !reached_fixed_point {
            log::warn!(
                "bundle reconciliation stopped at the {iterations}-pass cap without settling"
            );
        }

        BundleOutcome {
            bundles,
            flagged,
            reached_fixed_point,
            iterations,
        }
    }
}

fn partial_overlaps(bundles: &[FamilyBundle]) -> Vec<OverlapFlag> {
    let mut flags = Vec::new();
    for (i, left) in bundles.iter().enumerate() {
        for right in &bundles[i + 1..] {
            let shared: BTreeSet<RecordId> =
                left.members.intersection(&right.members).copied().collect();
            if !shared.is_empty()
                && !left.members.is_subset(&right.members)
                && !right.members.is_subset(&left.members)
            {
                flags.push(OverlapFlag {
                    left: left.clone(),
                    right: right.clone(),
                    shared,
                });
            }
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{birth, MemoryRecord, RecordType};
    use std::sync::Arc;

    fn record(id: u64) -> Arc<MemoryRecord> {
        Arc::new(
            MemoryRecord::empty(id, RecordType::Birth)
                .with_field(birth::STANDARDISED_ID, format!("B{id}")),
        )
    }

    fn sibling_link(a: u64, b: u64) -> Link<MemoryRecord> {
        Link {
            record_a: record(a),
            record_b: record(b),
            distance: 0.1,
            confidence: 1.0,
            kind: "SIBLING".into(),
            provenance: "test".into(),
            role_a: String::new(),
            role_b: String::new(),
        }
    }

    fn bundle(ids: &[u64]) -> FamilyBundle {
        FamilyBundle::new(ids.iter().copied())
    }

    #[test]
    fn test_consistent_links_collapse_to_one_family() {
        // Closed triangle 1-2-3 plus an unrelated pair 7-8.
        let links = vec![
            sibling_link(1, 2),
            sibling_link(2, 3),
            sibling_link(1, 3),
            sibling_link(7, 8),
        ];

        let outcome = FamilyBundleMerger::default().bundle(&links);
        assert!(outcome.reached_fixed_point);
        assert!(outcome.flagged.is_empty());
        assert_eq!(outcome.bundles.len(), 2);
        assert!(outcome.bundles.contains(&bundle(&[1, 2, 3])));
        assert!(outcome.bundles.contains(&bundle(&[7, 8])));
    }

    #[test]
    fn test_subset_bundles_are_absorbed() {
        // Open path 1-2-3: the end records see only the middle one, the
        // middle sees both. End bundles are strict subsets of the middle's.
        let links = vec![sibling_link(1, 2), sibling_link(2, 3)];

        let outcome = FamilyBundleMerger::default().bundle(&links);
        assert!(outcome.reached_fixed_point);
        assert_eq!(outcome.bundles, vec![bundle(&[1, 2, 3])]);
    }

    #[test]
    fn test_partial_overlap_is_flagged_and_kept_distinct() {
        let outcome = FamilyBundleMerger::default()
            .reconcile(vec![bundle(&[1, 2, 3]), bundle(&[2, 3, 4])]);

        assert!(outcome.reached_fixed_point);
        assert_eq!(outcome.bundles.len(), 2);
        assert_eq!(outcome.flagged.len(), 1);
        let flag = &outcome.flagged[0];
        assert_eq!(flag.shared, bundle(&[2, 3]).members);
    }

    #[test]
    fn test_identical_bundles_merge() {
        let outcome = FamilyBundleMerger::default()
            .reconcile(vec![bundle(&[5, 6]), bundle(&[5, 6]), bundle(&[5, 6])]);
        assert_eq!(outcome.bundles, vec![bundle(&[5, 6])]);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        // A single merging pass is not enough for a three-deep chain of
        // subsets presented superset-first against a cap of one.
        let merger = FamilyBundleMerger::new(1);
        let outcome =
            merger.reconcile(vec![bundle(&[1]), bundle(&[1, 2]), bundle(&[1, 2, 3])]);
        assert_eq!(outcome.iterations, 1);
        // The single pass still settles this input; the flag only reports
        // whether an extra pass confirmed the fixed point.
        assert!(!outcome.reached_fixed_point);
        assert_eq!(outcome.bundles, vec![bundle(&[1, 2, 3])]);
    }

    #[test]
    fn test_reconciliation_is_idempotent_at_fixed_point() {
        let merger = FamilyBundleMerger::default();
        let first = merger.reconcile(vec![bundle(&[1, 2]), bundle(&[1, 2, 3]), bundle(&[7, 8])]);
        assert!(first.reached_fixed_point);

        let second = merger.reconcile(first.bundles.clone());
        assert_eq!(second.bundles, first.bundles);
        assert_eq!(second.iterations, 1);
    }

    #[test]
    fn test_empty_input() {
        let outcome = FamilyBundleMerger::default().bundle::<MemoryRecord>(&[]);
        assert!(outcome.bundles.is_empty());
        assert!(outcome.reached_fixed_point);
    }
}
