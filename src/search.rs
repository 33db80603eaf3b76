//! Candidate search index interface.
//!
//! The real metric-space index (reference-point pruning over a true metric)
//! is an external component; this module defines the narrow surface the
//! linker consumes, plus [`LinearScanIndex`], an exhaustive reference
//! implementation used for tests and small inputs.
//!
//! Construction failure is a distinct error kind from an empty range query:
//! a degenerate reference-point configuration means any results would be
//! untrustworthy, while zero candidates is a perfectly valid answer.

use crate::error::{Error, Result};
use crate::measure::CompositeMeasure;
use crate::record::VitalRecord;
use std::sync::Arc;

/// One record returned by a range query, with its distance from the query.
#[derive(Debug, Clone)]
pub struct RangeMatch<R> {
    /// The stored record.
    pub record: Arc<R>,
    /// Distance between the query record and `record`.
    pub distance: f64,
}

/// A built candidate search structure over one stored record collection.
pub trait SearchIndex<R: VitalRecord>: Send + Sync {
    /// All stored records within `threshold` of `query`.
    ///
    /// An empty result is a valid answer, not an error.
    fn range_query(&self, query: &R, threshold: f64) -> Vec<RangeMatch<R>>;

    /// Release any resources held by the index.
    fn terminate(&mut self) {}
}

/// Builds a [`SearchIndex`] over a stored record collection.
///
/// Retry policy on construction failure (e.g. fewer reference points) belongs
/// to the index implementation, not to callers of this crate.
pub trait SearchIndexFactory<R: VitalRecord> {
    /// Build an index, or fail with [`Error::IndexConstruction`].
    fn build(
        &self,
        measure: Arc<CompositeMeasure>,
        records: &[Arc<R>],
    ) -> Result<Box<dyn SearchIndex<R>>>;
}

// =============================================================================
// Linear scan reference implementation
// =============================================================================

/// Exhaustive-scan index: every range query compares against every stored
/// record.
///
/// Correct for any measure, metric or not; quadratic overall, so only
/// suitable for tests and small populations.
pub struct LinearScanIndex<R> {
    measure: Arc<CompositeMeasure>,
    records: Vec<Arc<R>>,
}

impl<R: VitalRecord> SearchIndex<R> for LinearScanIndex<R> {
    fn range_query(&self, query: &R, threshold: f64) -> Vec<RangeMatch<R>> {
        self.records
            .iter()
            .filter_map(|stored| {
                let distance = self.measure.distance(query, stored.as_ref());
                (distance <= threshold).then(|| RangeMatch {
                    record: Arc::clone(stored),
                    distance,
                })
            })
            .collect()
    }
}

/// Factory for [`LinearScanIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScanFactory;

impl<R: VitalRecord + 'static> SearchIndexFactory<R> for LinearScanFactory {
    fn build(
        &self,
        measure: Arc<CompositeMeasure>,
        records: &[Arc<R>],
    ) -> Result<Box<dyn SearchIndex<R>>> {
        if records.is_empty() {
            return Err(Error::index_construction(
                "cannot build an index over an empty record collection",
            ));
        }
        Ok(Box::new(LinearScanIndex {
            measure,
            records: records.to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{AggregationPolicy, ImputationPolicy};
    use crate::metric::BigramJaccard;
    use crate::record::{birth, MemoryRecord, RecordType};

    fn measure() -> Arc<CompositeMeasure> {
        Arc::new(
            CompositeMeasure::new(
                Arc::new(BigramJaccard),
                vec![birth::FATHER_SURNAME],
                ImputationPolicy::One,
                AggregationPolicy::Mean,
            )
            .unwrap(),
        )
    }

    fn record(id: u64, surname: &str) -> Arc<MemoryRecord> {
        Arc::new(
            MemoryRecord::empty(id, RecordType::Birth)
                .with_field(birth::STANDARDISED_ID, format!("B{id}"))
                .with_field(birth::FATHER_SURNAME, surname),
        )
    }

    #[test]
    fn test_empty_collection_is_construction_failure() {
        let result = LinearScanFactory.build(measure(), &[] as &[Arc<MemoryRecord>]);
        assert!(matches!(result, Err(Error::IndexConstruction(_))));
    }

    #[test]
    fn test_range_query_respects_threshold() {
        let records = vec![record(1, "NÄS"), record(2, "BOMAN"), record(3, "NÄSS")];
        let index = LinearScanFactory.build(measure(), &records).unwrap();

        let query = record(4, "NÄS");
        let matches = index.range_query(&query, 0.5);

        assert!(matches.iter().any(|m| m.record.id() == 1));
        assert!(matches.iter().all(|m| m.distance <= 0.5));
        assert!(!matches.iter().any(|m| m.record.id() == 2));
    }

    #[test]
    fn test_factory_usable_through_generic_trait_surface() {
        // Callers hold factories as `&dyn SearchIndexFactory<R>` for their
        // own record type; the boxed index must outlive the borrow.
        fn build_index<R: VitalRecord + 'static>(
            factory: &dyn SearchIndexFactory<R>,
            measure: Arc<CompositeMeasure>,
            records: &[Arc<R>],
        ) -> Box<dyn SearchIndex<R>> {
            factory.build(measure, records).unwrap()
        }

        let records = vec![record(1, "NÄS"), record(2, "NÄSS")];
        let index = build_index(&LinearScanFactory, measure(), &records);
        let matches = index.range_query(&record(3, "NÄS"), 0.5);
        assert!(matches.iter().any(|m| m.record.id() == 1));
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let records = vec![record(1, "BOMAN")];
        let index = LinearScanFactory.build(measure(), &records).unwrap();

        let query = record(2, "XYZQW");
        assert!(index.range_query(&query, 0.1).is_empty());
    }
}
