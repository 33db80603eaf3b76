//! Threshold-based link formation over candidate record pairs.
//!
//! A [`ThresholdLinker`] sweeps candidate pairs — the full cross product, or
//! range-query results from an external [`SearchIndex`] — computes each
//! pair's composite distance, and emits a [`Link`] for every pair at or under
//! the threshold. The output is a *set*: no self pairs, no symmetric
//! duplicates, ordering unspecified.
//!
//! Distance computations are pure, so the sweep parallelizes freely under the
//! `parallel` feature. Long sweeps poll a [`CancelToken`] at a bounded
//! granularity.

use crate::config::{CancelToken, LinkageConfig};
use crate::error::{Error, Result};
use crate::measure::CompositeMeasure;
use crate::record::{FieldIndex, RecordId, VitalRecord};
use crate::search::SearchIndexFactory;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// An accepted link between two records.
///
/// Produced once by a linking run and never mutated. Persistence belongs to
/// the external link graph store.
#[derive(Debug)]
pub struct Link<R> {
    /// First endpoint record.
    pub record_a: Arc<R>,
    /// Second endpoint record.
    pub record_b: Arc<R>,
    /// Composite distance between the endpoints; always `<=` the threshold
    /// that produced the link.
    pub distance: f64,
    /// Confidence in `[0, 1]`; 1.0 unless the producing rule says otherwise.
    pub confidence: f64,
    /// Relationship kind, e.g. `"SIBLING"` or `"ID"`.
    pub kind: String,
    /// Free-text provenance identifying the producing rule or run.
    pub provenance: String,
    /// Role of the first endpoint, e.g. `"baby"`.
    pub role_a: String,
    /// Role of the second endpoint.
    pub role_b: String,
}

// Endpoints are shared through `Arc`, so cloning never requires the record
// type itself to be cloneable.
impl<R> Clone for Link<R> {
    fn clone(&self) -> Self {
        Self {
            record_a: Arc::clone(&self.record_a),
            record_b: Arc::clone(&self.record_b),
            distance: self.distance,
            confidence: self.confidence,
            kind: self.kind.clone(),
            provenance: self.provenance.clone(),
            role_a: self.role_a.clone(),
            role_b: self.role_b.clone(),
        }
    }
}

impl<R: VitalRecord> Link<R> {
    /// The endpoint ids as an unordered pair (smaller id first).
    #[must_use]
    pub fn unordered_ids(&self) -> (RecordId, RecordId) {
        let (a, b) = (self.record_a.id(), self.record_b.id());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Pair-level filter applied before a link is accepted.
///
/// Used for domain viability constraints, e.g. sibling birth years more than
/// a configured gap apart can never link.
pub type ViabilityCheck<R> = Arc<dyn Fn(&R, &R) -> bool + Send + Sync>;

/// Links every candidate pair whose composite distance is within a threshold.
pub struct ThresholdLinker<R> {
    measure: Arc<CompositeMeasure>,
    threshold: f64,
    kind: String,
    provenance: String,
    role_a: String,
    role_b: String,
    viability: Option<ViabilityCheck<R>>,
    config: LinkageConfig,
}

impl<R: VitalRecord> ThresholdLinker<R> {
    /// Create a linker.
    ///
    /// `kind` names the relationship being formed; `provenance` identifies
    /// this run in downstream graph queries.
    pub fn new(
        measure: Arc<CompositeMeasure>,
        threshold: f64,
        kind: impl Into<String>,
        provenance: impl Into<String>,
        config: LinkageConfig,
    ) -> Result<Self> {
        if !(threshold >= 0.0) {
            return Err(Error::config("threshold must be non-negative"));
        }
        Ok(Self {
            measure,
            threshold,
            kind: kind.into(),
            provenance: provenance.into(),
            role_a: String::new(),
            role_b: String::new(),
            viability: None,
            config,
        })
    }

    /// Attach role labels for the two endpoints.
    #[must_use]
    pub fn with_roles(mut self, role_a: impl Into<String>, role_b: impl Into<String>) -> Self {
        self.role_a = role_a.into();
        self.role_b = role_b.into();
        self
    }

    /// Attach a viability predicate; pairs failing it are never linked.
    #[must_use]
    pub fn with_viability(mut self, check: ViabilityCheck<R>) -> Self {
        self.viability = Some(check);
        self
    }

    /// Install the sibling birth-year viability check from the run
    /// configuration.
    ///
    /// Pairs whose `year_field` values differ by more than
    /// [`LinkageConfig::max_sibling_age_diff`] years are never linked. A
    /// blank or unparseable year on either side leaves the pair viable, and
    /// `None` in the configuration disables the check entirely.
    #[must_use]
    pub fn with_year_gap_viability(mut self, year_field: FieldIndex) -> Self
    where
        R: 'static,
    {
        let Some(max_gap) = self.config.max_sibling_age_diff else {
            return self;
        };
        self.viability = Some(Arc::new(move |a: &R, b: &R| {
            let (Ok(ya), Ok(yb)) = (
                a.get_field(year_field).trim().parse::<i64>(),
                b.get_field(year_field).trim().parse::<i64>(),
            ) else {
                return true;
            };
            (ya - yb).unsigned_abs() <= u64::from(max_gap)
        }));
        self
    }

    /// The linking threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Link by exhaustive cross product of the two collections.
    ///
    /// When both collections are the same set (detected by record identity),
    /// self pairs and symmetric duplicates are suppressed; either way the
    /// output never contains two links over the same unordered id pair.
    pub fn link_cross_product(
        &self,
        records_a: &[Arc<R>],
        records_b: &[Arc<R>],
        cancel: &CancelToken,
    ) -> Result<Vec<Link<R>>> {
        log::info!(
            "cross-product linkage: {} x {} records, threshold {}",
            records_a.len(),
            records_b.len(),
            self.threshold
        );

        let candidates = self.sweep(records_a, records_b, cancel)?;
        Ok(self.dedup(candidates))
    }

    /// Link using an external candidate search index built over `stored`.
    ///
    /// Each search record issues one range query at the linking threshold.
    /// Index construction failure propagates as
    /// [`Error::IndexConstruction`]; a search record with zero candidates is
    /// simply skipped.
    pub fn link_with_index(
        &self,
        factory: &dyn SearchIndexFactory<R>,
        stored: &[Arc<R>],
        search: &[Arc<R>],
        cancel: &CancelToken,
    ) -> Result<Vec<Link<R>>> {
        let index = factory.build(Arc::clone(&self.measure), stored)?;

        log::info!(
            "index-backed linkage: {} stored, {} search records, threshold {}",
            stored.len(),
            search.len(),
            self.threshold
        );

        let mut candidates = Vec::new();
        let mut comparisons: u64 = 0;

        for query in search {
            for m in index.range_query(query, self.threshold) {
                candidates.push(self.make_link(Arc::clone(&m.record), Arc::clone(query), m.distance));
            }
            comparisons += stored.len() as u64;
            if comparisons % self.config.cancel_check_interval < stored.len() as u64
                && cancel.is_cancelled()
            {
                return Err(Error::Cancelled { comparisons });
            }
        }

        Ok(self.dedup(candidates))
    }

    /// Distance sweep over the full cross product.
    #[cfg(feature = "parallel")]
    fn sweep(
        &self,
        records_a: &[Arc<R>],
        records_b: &[Arc<R>],
        cancel: &CancelToken,
    ) -> Result<Vec<Link<R>>> {
        let links: Vec<Link<R>> = records_a
            .par_iter()
            .flat_map_iter(|a| {
                // One poll per row keeps the check granularity bounded by the
                // inner collection size.
                if cancel.is_cancelled() {
                    return Vec::new().into_iter();
                }
                records_b
                    .iter()
                    .filter_map(|b| self.try_pair(a, b))
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                comparisons: (records_a.len() * records_b.len()) as u64,
            });
        }
        Ok(links)
    }

    #[cfg(not(feature = "parallel"))]
    fn sweep(
        &self,
        records_a: &[Arc<R>],
        records_b: &[Arc<R>],
        cancel: &CancelToken,
    ) -> Result<Vec<Link<R>>> {
        let mut links = Vec::new();
        let mut comparisons: u64 = 0;

        for a in records_a {
            for b in records_b {
                comparisons += 1;
                if comparisons % self.config.cancel_check_interval == 0 && cancel.is_cancelled() {
                    return Err(Error::Cancelled { comparisons });
                }
                if let Some(link) = self.try_pair(a, b) {
                    links.push(link);
                }
            }
        }
        Ok(links)
    }

    /// Evaluate one candidate pair against threshold and viability.
    fn try_pair(&self, a: &Arc<R>, b: &Arc<R>) -> Option<Link<R>> {
        if a.id() == b.id() {
            return None;
        }
        if let Some(check) = &self.viability {
            if !check(a.as_ref(), b.as_ref()) {
                return None;
            }
        }
        let distance = self.measure.distance(a.as_ref(), b.as_ref());
        (distance <= self.threshold).then(|| self.make_link(Arc::clone(a), Arc::clone(b), distance))
    }

    fn make_link(&self, record_a: Arc<R>, record_b: Arc<R>, distance: f64) -> Link<R> {
        Link {
            record_a,
            record_b,
            distance,
            confidence: 1.0,
            kind: self.kind.clone(),
            provenance: self.provenance.clone(),
            role_a: self.role_a.clone(),
            role_b: self.role_b.clone(),
        }
    }

    /// Drop self pairs and keep one link per unordered id pair.
    fn dedup(&self, candidates: Vec<Link<R>>) -> Vec<Link<R>> {
        let mut seen: HashSet<(RecordId, RecordId)> = HashSet::new();
        let mut links = Vec::with_capacity(candidates.len());
        for link in candidates {
            let key = link.unordered_ids();
            if key.0 == key.1 {
                continue;
            }
            if seen.insert(key) {
                links.push(link);
            }
        }
        links
    }
}
