//! Ground-truth classification of record pairs.
//!
//! Vital-event datasets carry partial identity annotations: a birth record
//! may name the mother's identity, or may leave it blank. A
//! [`GroundTruthClassifier`] turns those annotations into a four-way verdict
//! per pair, so that linkage output can be scored without pretending absent
//! annotations are negatives.

use crate::record::{FieldIndex, VitalRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// All field pairs of a mapping non-blank and equal between the two records.
fn mapping_matches<R: VitalRecord>(
    mapping: &[(FieldIndex, FieldIndex)],
    a: &R,
    b: &R,
) -> bool {
    mapping.iter().all(|&(field_a, field_b)| {
        let va = a.get_field(field_a).trim();
        let vb = b.get_field(field_b).trim();
        !va.is_empty() && va == vb
    })
}

// ============================================================================
// Link status
// ============================================================================

/// Verdict for one record pair against the ground-truth annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Some identity alternative matched on every field, none empty.
    TrueMatch,
    /// Annotations present and disagreeing.
    NotTrueMatch,
    /// Annotations too sparse to decide, per the absent-annotation policy.
    Unknown,
    /// At least one endpoint is on the exclusion list.
    Excluded,
}

impl LinkStatus {
    /// Stable label used in logs and serialized evaluation output.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkStatus::TrueMatch => "true_match",
            LinkStatus::NotTrueMatch => "not_true_match",
            LinkStatus::Unknown => "unknown",
            LinkStatus::Excluded => "excluded",
        }
    }

    /// Parse a label produced by [`as_label`](Self::as_label).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "true_match" => Some(LinkStatus::TrueMatch),
            "not_true_match" => Some(LinkStatus::NotTrueMatch),
            "unknown" => Some(LinkStatus::Unknown),
            "excluded" => Some(LinkStatus::Excluded),
            _ => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

// ============================================================================
// Absent-annotation policy
// ============================================================================

/// How to treat pairs whose identity annotations are (partially) blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsentGroundTruthPolicy {
    /// `Unknown` only when *every* annotation field on both sides is blank.
    /// An identifier present on either side, even with nothing to compare
    /// it against, makes the pair a `NotTrueMatch`.
    #[default]
    Strict,
    /// `Unknown` as soon as *any* annotation field on either side is blank.
    Lenient,
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifies record pairs against identity annotations.
///
/// An *alternative* is a list of field pairs `(on_a, on_b)` that jointly
/// establish identity; the pair is a true match if any one alternative has
/// every field non-blank and equal on both sides. Multiple alternatives
/// cover datasets where the same relationship is recorded through different
/// field combinations.
pub struct GroundTruthClassifier {
    alternatives: Vec<Vec<(FieldIndex, FieldIndex)>>,
    exclusions: Vec<Vec<(FieldIndex, FieldIndex)>>,
    policy: AbsentGroundTruthPolicy,
}

impl GroundTruthClassifier {
    /// Build a classifier from identity-field alternatives.
    #[must_use]
    pub fn new(
        alternatives: Vec<Vec<(FieldIndex, FieldIndex)>>,
        policy: AbsentGroundTruthPolicy,
    ) -> Self {
        Self {
            alternatives,
            exclusions: Vec::new(),
            policy,
        }
    }

    /// Attach exclusion mappings, matched like alternatives and checked
    /// first.
    ///
    /// A pair agreeing on every field of any one exclusion mapping
    /// classifies as [`LinkStatus::Excluded`] regardless of its other
    /// annotations. Used to keep a record from being scored against a data
    /// artifact of itself, e.g. a birth matched to the record its own
    /// identifier was derived from.
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: Vec<Vec<(FieldIndex, FieldIndex)>>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Classify one pair.
    ///
    /// Order of checks: exclusion mappings, then alternative agreement, then
    /// the absent-annotation policy, then `NotTrueMatch`.
    pub fn classify<R: VitalRecord>(&self, a: &R, b: &R) -> LinkStatus {
        for mapping in &self.exclusions {
            if !mapping.is_empty() && mapping_matches(mapping, a, b) {
                return LinkStatus::Excluded;
            }
        }

        let mut all_blank = true;
        let mut any_blank = false;

        for alternative in &self.alternatives {
            let mut matched = !alternative.is_empty();
            for &(field_a, field_b) in alternative {
                let va = a.get_field(field_a).trim();
                let vb = b.get_field(field_b).trim();
                // An identifier on either side alone is still evidence.
                if !va.is_empty() || !vb.is_empty() {
                    all_blank = false;
                }
                if va.is_empty() || vb.is_empty() {
                    any_blank = true;
                    matched = false;
                } else if va != vb {
                    matched = false;
                }
            }
            if matched {
                return LinkStatus::TrueMatch;
            }
        }

        let undecidable = match self.policy {
            AbsentGroundTruthPolicy::Strict => all_blank,
            AbsentGroundTruthPolicy::Lenient => any_blank,
        };
        if undecidable {
            LinkStatus::Unknown
        } else {
            LinkStatus::NotTrueMatch
        }
    }

}

impl fmt::Debug for GroundTruthClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroundTruthClassifier")
            .field("alternatives", &self.alternatives)
            .field("exclusions", &self.exclusions)
            .field("policy", &self.policy)
            .finish()
    }
}
