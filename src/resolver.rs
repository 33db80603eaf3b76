//! Open-triangle consistency resolution.
//!
//! Sibling linkage is transitive in the world but not in the link graph: if
//! x and z each link to a pivot y but not to each other, either the missing
//! edge was a near miss or one of the existing edges is wrong. The resolver
//! walks every open triangle of one link kind and emits an explicit decision
//! for each; no triangle is silently dropped.

use crate::error::Result;
use crate::graph::{GraphEdge, LinkGraphStore, OpenTriangle};
use crate::measure::CompositeMeasure;
use crate::metric::jaccard_distance_sets;
use crate::record::{FieldIndex, RecordId, VitalRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Decisions
// ============================================================================

/// Outcome for one open triangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriangleDecision {
    /// Close the triangle: the x-z edge should exist.
    AssertEdge {
        /// The open triangle being decided.
        triangle: OpenTriangle,
        /// Composite distance between x and z.
        distance: f64,
        /// Which heuristic closed it.
        reason: String,
    },
    /// The triangle is genuinely inconsistent; cut the named edge.
    Reject {
        /// The open triangle being decided.
        triangle: OpenTriangle,
        /// One endpoint of the edge to cut.
        cut_a: RecordId,
        /// The other endpoint of the edge to cut.
        cut_b: RecordId,
        /// Why the triangle cannot stand.
        reason: String,
    },
    /// No heuristic fired; leave the triangle open.
    Defer {
        /// The open triangle being decided.
        triangle: OpenTriangle,
    },
    /// Contradictory evidence; a human should look.
    FlagForReview {
        /// The open triangle being decided.
        triangle: OpenTriangle,
        /// The contradiction observed.
        reason: String,
    },
}

impl TriangleDecision {
    /// The triangle this decision is about.
    #[must_use]
    pub fn triangle(&self) -> &OpenTriangle {
        match self {
            TriangleDecision::AssertEdge { triangle, .. }
            | TriangleDecision::Reject { triangle, .. }
            | TriangleDecision::Defer { triangle }
            | TriangleDecision::FlagForReview { triangle, .. } => triangle,
        }
    }
}

/// Itemized outcome of one resolver pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// One decision per open triangle, in enumeration order.
    pub decisions: Vec<TriangleDecision>,
}

impl ResolutionReport {
    /// Count of decisions of each variant, in declaration order.
    #[must_use]
    pub fn tally(&self) -> (usize, usize, usize, usize) {
        let mut t = (0, 0, 0, 0);
        for d in &self.decisions {
            match d {
                TriangleDecision::AssertEdge { .. } => t.0 += 1,
                TriangleDecision::Reject { .. } => t.1 += 1,
                TriangleDecision::Defer { .. } => t.2 += 1,
                TriangleDecision::FlagForReview { .. } => t.3 += 1,
            }
        }
        t
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds steering the resolver heuristics.
///
/// Every bound is explicit configuration; the defaults reflect values that
/// have worked on historical Scandinavian registers but carry no special
/// status.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Close the triangle when `d(x,y) + d(y,z)` is at or under this bound.
    pub max_combined_distance: f64,
    /// Close when the Jaccard similarity of the x and z neighbour sets is at
    /// or above this bound.
    pub min_shared_neighbour_similarity: f64,
    /// Fields that must agree exactly and non-blank between x and z for the
    /// secondary-agreement heuristic, e.g. both parents' surnames.
    pub agreement_fields: Vec<FieldIndex>,
    /// Field holding the event year used by the plausibility veto; `None`
    /// disables the veto.
    pub year_field: Option<FieldIndex>,
    /// Two records whose event years differ by more than this are never the
    /// same family.
    pub max_year_gap: u32,
    /// Threshold a hypothetical x-z link would have to meet.
    pub link_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_combined_distance: 0.25,
            min_shared_neighbour_similarity: 0.2,
            agreement_fields: Vec::new(),
            year_field: None,
            max_year_gap: 40,
            link_threshold: 0.2,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves open triangles of one link kind against a graph snapshot.
pub struct ClusterConsistencyResolver {
    measure: Arc<CompositeMeasure>,
    config: ResolverConfig,
}

impl ClusterConsistencyResolver {
    #[must_use]
    pub fn new(measure: Arc<CompositeMeasure>, config: ResolverConfig) -> Self {
        Self { measure, config }
    }

    /// Decide every open triangle of `kind` in the graph snapshot.
    ///
    /// `records` maps graph node ids to their records; a triangle touching
    /// an id absent from the map is flagged for review, never dropped.
    pub fn resolve<R, G>(
        &self,
        graph: &G,
        records: &HashMap<RecordId, Arc<R>>,
        kind: &str,
    ) -> Result<ResolutionReport>
    where
        R: VitalRecord,
        G: LinkGraphStore + ?Sized,
    {
        let triangles = graph.open_triangles(kind)?;
        log::info!("resolving {} open {kind} triangles", triangles.len());

        let mut report = ResolutionReport::default();
        for triangle in triangles {
            let decision = self.decide(graph, records, kind, triangle);
            log::debug!("triangle {triangle:?}: {decision:?}");
            report.decisions.push(decision);
        }
        Ok(report)
    }

    fn decide<R, G>(
        &self,
        graph: &G,
        records: &HashMap<RecordId, Arc<R>>,
        kind: &str,
        triangle: OpenTriangle,
    ) -> TriangleDecision
    where
        R: VitalRecord,
        G: LinkGraphStore + ?Sized,
    {
        let (Some(x), Some(pivot), Some(z)) = (
            records.get(&triangle.x),
            records.get(&triangle.pivot),
            records.get(&triangle.z),
        ) else {
            return TriangleDecision::FlagForReview {
                triangle,
                reason: "record unavailable in lookup".into(),
            };
        };

        let xz_plausible = self.plausible(x.as_ref(), z.as_ref());

        if xz_plausible {
            // Heuristic 1: the two existing edges are jointly tight enough.
            if let (Some(xy), Some(yz)) = (
                graph.edge(triangle.x, triangle.pivot, kind),
                graph.edge(triangle.pivot, triangle.z, kind),
            ) {
                let combined = xy.distance + yz.distance;
                if combined <= self.config.max_combined_distance {
                    return TriangleDecision::AssertEdge {
                        triangle,
                        distance: self.measure.distance(x.as_ref(), z.as_ref()),
                        reason: format!("combined path distance {combined:.4}"),
                    };
                }
            }

            // Heuristic 2: x and z share enough of their neighbourhoods
            // beyond the pivot itself.
            let nx: HashSet<RecordId> = graph
                .neighbours(triangle.x, kind)
                .into_iter()
                .filter(|&n| n != triangle.z && n != triangle.pivot)
                .collect();
            let nz: HashSet<RecordId> = graph
                .neighbours(triangle.z, kind)
                .into_iter()
                .filter(|&n| n != triangle.x && n != triangle.pivot)
                .collect();
            // Two isolated records share nothing; support needs witnesses.
            let similarity = if nx.is_empty() && nz.is_empty() {
                0.0
            } else {
                1.0 - jaccard_distance_sets(&nx, &nz)
            };
            if similarity >= self.config.min_shared_neighbour_similarity {
                return TriangleDecision::AssertEdge {
                    triangle,
                    distance: self.measure.distance(x.as_ref(), z.as_ref()),
                    reason: format!("shared neighbour similarity {similarity:.4}"),
                };
            }

            // Heuristic 3: independent secondary fields agree exactly.
            if !self.config.agreement_fields.is_empty()
                && self.fields_agree(x.as_ref(), z.as_ref())
            {
                return TriangleDecision::AssertEdge {
                    triangle,
                    distance: self.measure.distance(x.as_ref(), z.as_ref()),
                    reason: "exact secondary-field agreement".into(),
                };
            }

            return TriangleDecision::Defer { triangle };
        }

        // x-z is implausible. Decide between a clean cut and a contradiction
        // worth human eyes: when exactly one of the three pair validities
        // fails, the evidence points at a single bad edge and repairing it
        // automatically risks compounding the error.
        let xy_ok = self.pair_valid(x.as_ref(), pivot.as_ref());
        let yz_ok = self.pair_valid(pivot.as_ref(), z.as_ref());
        let xz_ok =
            xz_plausible && self.measure.distance(x.as_ref(), z.as_ref()) <= self.config.link_threshold;

        if exactly_one_false(xy_ok, yz_ok, xz_ok) {
            return TriangleDecision::FlagForReview {
                triangle,
                reason: "exactly one pair hypothesis fails".into(),
            };
        }

        let (cut_a, cut_b) = self.weaker_edge(graph, kind, triangle);
        TriangleDecision::Reject {
            triangle,
            cut_a,
            cut_b,
            reason: format!(
                "event-year gap exceeds {} years",
                self.config.max_year_gap
            ),
        }
    }

    /// Event-year plausibility. Unparseable or missing years cannot veto.
    fn plausible<R: VitalRecord>(&self, a: &R, b: &R) -> bool {
        let Some(field) = self.config.year_field else {
            return true;
        };
        let (Ok(ya), Ok(yb)) = (
            a.get_field(field).trim().parse::<i64>(),
            b.get_field(field).trim().parse::<i64>(),
        ) else {
            return true;
        };
        (ya - yb).unsigned_abs() <= u64::from(self.config.max_year_gap)
    }

    fn pair_valid<R: VitalRecord>(&self, a: &R, b: &R) -> bool {
        self.plausible(a, b) && self.measure.distance(a, b) <= self.config.link_threshold
    }

    fn fields_agree<R: VitalRecord>(&self, a: &R, b: &R) -> bool {
        self.config.agreement_fields.iter().all(|&field| {
            let va = a.get_field(field).trim();
            let vb = b.get_field(field).trim();
            !va.is_empty() && va == vb
        })
    }

    /// The existing triangle edge with the larger distance.
    fn weaker_edge<G>(&self, graph: &G, kind: &str, t: OpenTriangle) -> (RecordId, RecordId)
    where
        G: LinkGraphStore + ?Sized,
    {
        let xy = graph.edge(t.x, t.pivot, kind).map(|e| e.distance);
        let yz = graph.edge(t.pivot, t.z, kind).map(|e| e.distance);
        match (xy, yz) {
            (Some(a), Some(b)) if a >= b => (t.x, t.pivot),
            (Some(_), Some(_)) | (None, Some(_)) => (t.pivot, t.z),
            _ => (t.x, t.pivot),
        }
    }
}

/// True when exactly one of the three flags is false.
fn exactly_one_false(a: bool, b: bool, c: bool) -> bool {
    if a {
        b != c
    } else {
        b && c
    }
}

/// Apply a report's actionable decisions to a writable graph.
///
/// Asserted edges are inserted with the given provenance; rejected edges are
/// annotated `deleted` with the decision's reason. Defer and review
/// decisions touch nothing.
pub fn apply_decisions<G>(
    graph: &mut G,
    report: &ResolutionReport,
    kind: &str,
    provenance: &str,
) -> Result<()>
where
    G: LinkGraphStore + ?Sized,
{
    for decision in &report.decisions {
        match decision {
            TriangleDecision::AssertEdge {
                triangle, distance, ..
            } => {
                graph.assert_edge(GraphEdge::new(
                    triangle.x,
                    triangle.z,
                    kind,
                    *distance,
                    provenance,
                ))?;
            }
            TriangleDecision::Reject {
                cut_a,
                cut_b,
                reason,
                ..
            } => {
                graph.annotate_edge(*cut_a, *cut_b, kind, "deleted", reason)?;
            }
            TriangleDecision::Defer { .. } | TriangleDecision::FlagForReview { .. } => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryLinkGraph;
    use crate::measure::{AggregationPolicy, ImputationPolicy};
    use crate::metric::BigramJaccard;
    use crate::record::{birth, MemoryRecord, RecordType};

    fn measure() -> Arc<CompositeMeasure> {
        Arc::new(
            CompositeMeasure::new(
                Arc::new(BigramJaccard),
                vec![
                    birth::FATHER_FORENAME,
                    birth::FATHER_SURNAME,
                    birth::MOTHER_FORENAME,
                    birth::MOTHER_MAIDEN_SURNAME,
                ],
                ImputationPolicy::One,
                AggregationPolicy::Mean,
            )
            .unwrap(),
        )
    }

    fn family_birth(id: u64, father: &str, mother: &str, year: &str) -> Arc<MemoryRecord> {
        Arc::new(
            MemoryRecord::empty(id, RecordType::Birth)
                .with_field(birth::STANDARDISED_ID, format!("B{id}"))
                .with_field(birth::FATHER_FORENAME, father)
                .with_field(birth::FATHER_SURNAME, "NÄS")
                .with_field(birth::MOTHER_FORENAME, mother)
                .with_field(birth::MOTHER_MAIDEN_SURNAME, "TJERNBERG")
                .with_field(birth::BIRTH_YEAR, year),
        )
    }

    fn lookup(records: &[Arc<MemoryRecord>]) -> HashMap<RecordId, Arc<MemoryRecord>> {
        records.iter().map(|r| (r.id(), Arc::clone(r))).collect()
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            max_combined_distance: 0.25,
            min_shared_neighbour_similarity: 0.2,
            agreement_fields: vec![birth::MOTHER_MAIDEN_SURNAME, birth::FATHER_SURNAME],
            year_field: Some(birth::BIRTH_YEAR),
            max_year_gap: 40,
            link_threshold: 0.3,
        }
    }

    fn sibling_graph(edges: &[(RecordId, RecordId, f64)]) -> InMemoryLinkGraph {
        let mut graph = InMemoryLinkGraph::new();
        for &(a, b, d) in edges {
            graph
                .assert_edge(GraphEdge::new(a, b, "SIBLING", d, "test"))
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_low_combined_distance_asserts_missing_edge() {
        let records = vec![
            family_birth(1, "ERIK", "MAJA", "1850"),
            family_birth(2, "ERIK", "MAJA", "1852"),
            family_birth(3, "ERIK", "MAJA", "1855"),
        ];
        let graph = sibling_graph(&[(1, 2, 0.10), (2, 3, 0.12)]);

        let resolver = ClusterConsistencyResolver::new(measure(), config());
        let report = resolver.resolve(&graph, &lookup(&records), "SIBLING").unwrap();

        assert_eq!(report.decisions.len(), 1);
        match &report.decisions[0] {
            TriangleDecision::AssertEdge { triangle, .. } => {
                assert_eq!(*triangle, OpenTriangle { x: 1, pivot: 2, z: 3 });
            }
            other => panic!("expected AssertEdge, got {other:?}"),
        }
    }

    #[test]
    fn test_implausible_year_gap_rejects() {
        // Same family names but 60 years apart and textually distant enough
        // that the x-z edge would not stand on its own either.
        let records = vec![
            family_birth(1, "ERIK X", "MAJA Q", "1810"),
            family_birth(2, "ERIK", "MAJA", "1850"),
            family_birth(3, "ERIKA P", "MARIA W", "1870"),
        ];
        let graph = sibling_graph(&[(1, 2, 0.28), (2, 3, 0.29)]);

        let mut cfg = config();
        cfg.agreement_fields.clear();
        let resolver = ClusterConsistencyResolver::new(measure(), cfg);
        let report = resolver.resolve(&graph, &lookup(&records), "SIBLING").unwrap();

        assert_eq!(report.decisions.len(), 1);
        match &report.decisions[0] {
            TriangleDecision::Reject { cut_a, cut_b, .. } => {
                // The weaker of the two edges is (2, 3).
                assert_eq!((*cut_a, *cut_b), (2, 3));
            }
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[test]
    fn test_single_failing_hypothesis_flags_for_review() {
        // x and pivot are clearly siblings; z is implausibly late against x
        // but still a fine match for the pivot textually and by year, so
        // exactly one pair hypothesis (x-z) fails.
        let records = vec![
            family_birth(1, "ERIK", "MAJA", "1820"),
            family_birth(2, "ERIK", "MAJA", "1850"),
            family_birth(3, "ERIK", "MAJA", "1875"),
        ];
        let graph = sibling_graph(&[(1, 2, 0.10), (2, 3, 0.10)]);

        let resolver = ClusterConsistencyResolver::new(measure(), config());
        let report = resolver.resolve(&graph, &lookup(&records), "SIBLING").unwrap();

        assert_eq!(report.decisions.len(), 1);
        assert!(
            matches!(report.decisions[0], TriangleDecision::FlagForReview { .. }),
            "got {:?}",
            report.decisions[0]
        );
    }

    #[test]
    fn test_missing_record_is_flagged_not_dropped() {
        let records = vec![
            family_birth(1, "ERIK", "MAJA", "1850"),
            family_birth(2, "ERIK", "MAJA", "1852"),
        ];
        // Node 3 exists in the graph but not in the record lookup.
        let graph = sibling_graph(&[(1, 2, 0.1), (2, 3, 0.1)]);

        let resolver = ClusterConsistencyResolver::new(measure(), config());
        let report = resolver.resolve(&graph, &lookup(&records), "SIBLING").unwrap();

        assert_eq!(report.decisions.len(), 1);
        assert!(matches!(
            report.decisions[0],
            TriangleDecision::FlagForReview { .. }
        ));
    }

    #[test]
    fn test_apply_decisions_closes_triangle() {
        let records = vec![
            family_birth(1, "ERIK", "MAJA", "1850"),
            family_birth(2, "ERIK", "MAJA", "1852"),
            family_birth(3, "ERIK", "MAJA", "1855"),
        ];
        let mut graph = sibling_graph(&[(1, 2, 0.10), (2, 3, 0.12)]);

        let resolver = ClusterConsistencyResolver::new(measure(), config());
        let report = resolver.resolve(&graph, &lookup(&records), "SIBLING").unwrap();
        apply_decisions(&mut graph, &report, "SIBLING", "resolver").unwrap();

        assert!(graph.edge(1, 3, "SIBLING").is_some());
        assert!(graph.open_triangles("SIBLING").unwrap().is_empty());
    }

    #[test]
    fn test_exactly_one_false_truth_table() {
        assert!(!exactly_one_false(true, true, true));
        assert!(exactly_one_false(true, true, false));
        assert!(exactly_one_false(true, false, true));
        assert!(exactly_one_false(false, true, true));
        assert!(!exactly_one_false(true, false, false));
        assert!(!exactly_one_false(false, false, true));
        assert!(!exactly_one_false(false, true, false));
        assert!(!exactly_one_false(false, false, false));
    }
}
