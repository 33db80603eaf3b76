//! Link graph surface.
//!
//! Accepted links live in an external graph store; the crate consumes it
//! through [`LinkGraphStore`] and only ever writes through `assert_edge` and
//! `annotate_edge` when applying resolver recommendations.
//! [`InMemoryLinkGraph`] is the in-crate backend for tests and small runs.

use crate::error::{Error, Result};
use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One stored edge of the link graph.
///
/// Endpoints are unordered; constructors normalize so `a <= b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Smaller endpoint id.
    pub a: RecordId,
    /// Larger endpoint id.
    pub b: RecordId,
    /// Relationship kind, e.g. `"SIBLING"`.
    pub kind: String,
    /// Composite distance recorded when the link was accepted.
    pub distance: f64,
    /// The producing rule or run.
    pub provenance: String,
    /// Free-form key/value annotations, e.g. `"deleted" -> "triangle"`.
    pub annotations: BTreeMap<String, String>,
}

impl GraphEdge {
    /// Build an edge with normalized endpoint order and no annotations.
    #[must_use]
    pub fn new(
        a: RecordId,
        b: RecordId,
        kind: impl Into<String>,
        distance: f64,
        provenance: impl Into<String>,
    ) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            a,
            b,
            kind: kind.into(),
            distance,
            provenance: provenance.into(),
            annotations: BTreeMap::new(),
        }
    }
}

/// An open triangle: `x` and `z` both link to the pivot `y`, but not to each
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenTriangle {
    /// One outer record.
    pub x: RecordId,
    /// The shared neighbour of `x` and `z`.
    pub pivot: RecordId,
    /// The other outer record.
    pub z: RecordId,
}

/// Read and write surface of the link graph store.
///
/// Reads operate on a snapshot; a resolver pass never observes its own
/// writes.
pub trait LinkGraphStore {
    /// All records linked to `record` by edges of `kind`.
    fn neighbours(&self, record: RecordId, kind: &str) -> Vec<RecordId>;

    /// The edge between two records, if present. Endpoint order is
    /// irrelevant.
    fn edge(&self, a: RecordId, b: RecordId, kind: &str) -> Option<GraphEdge>;

    /// Enumerate open triangles over edges of `kind`.
    ///
    /// Each triangle is reported once per pivot with `x < z`.
    fn open_triangles(&self, kind: &str) -> Result<Vec<OpenTriangle>>;

    /// Insert an edge, replacing any existing edge over the same pair and
    /// kind.
    fn assert_edge(&mut self, edge: GraphEdge) -> Result<()>;

    /// Attach an annotation to an existing edge.
    ///
    /// Fails with [`Error::Store`] when no such edge exists.
    fn annotate_edge(
        &mut self,
        a: RecordId,
        b: RecordId,
        kind: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;
}

/// Hash-map backed [`LinkGraphStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryLinkGraph {
    edges: HashMap<(RecordId, RecordId, String), GraphEdge>,
}

impl InMemoryLinkGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored edges across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn key(a: RecordId, b: RecordId, kind: &str) -> (RecordId, RecordId, String) {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        (a, b, kind.to_string())
    }
}

impl LinkGraphStore for InMemoryLinkGraph {
    fn neighbours(&self, record: RecordId, kind: &str) -> Vec<RecordId> {
        let mut out: Vec<RecordId> = self
            .edges
            .values()
            .filter(|e| e.kind == kind)
            .filter_map(|e| {
                if e.a == record {
                    Some(e.b)
                } else if e.b == record {
                    Some(e.a)
                } else {
                    None
                }
            })
            .collect();
        out.sort_unstable();
        out
    }

    fn edge(&self, a: RecordId, b: RecordId, kind: &str) -> Option<GraphEdge> {
        self.edges.get(&Self::key(a, b, kind)).cloned()
    }

    fn open_triangles(&self, kind: &str) -> Result<Vec<OpenTriangle>> {
        let mut adjacency: HashMap<RecordId, Vec<RecordId>> = HashMap::new();
        let mut present: HashSet<(RecordId, RecordId)> = HashSet::new();

        for edge in self.edges.values().filter(|e| e.kind == kind) {
            adjacency.entry(edge.a).or_default().push(edge.b);
            adjacency.entry(edge.b).or_default().push(edge.a);
            present.insert((edge.a, edge.b));
        }

        let mut triangles = Vec::new();
        let mut pivots: Vec<_> = adjacency.keys().copied().collect();
        pivots.sort_unstable();

        for pivot in pivots {
            let mut nbrs = adjacency[&pivot].clone();
            nbrs.sort_unstable();
            for (i, &x) in nbrs.iter().enumerate() {
                for &z in &nbrs[i + 1..] {
                    let key = if x <= z { (x, z) } else { (z, x) };
                    if !present.contains(&key) {
                        triangles.push(OpenTriangle { x, pivot, z });
                    }
                }
            }
        }
        Ok(triangles)
    }

    fn assert_edge(&mut self, edge: GraphEdge) -> Result<()> {
        let key = Self::key(edge.a, edge.b, &edge.kind);
        self.edges.insert(key, edge);
        Ok(())
    }

    fn annotate_edge(
        &mut self,
        a: RecordId,
        b: RecordId,
        kind: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let edge = self
            .edges
            .get_mut(&Self::key(a, b, kind))
            .ok_or_else(|| Error::store(format!("no {kind} edge between {a} and {b}")))?;
        edge.annotations.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sibling_edge(a: RecordId, b: RecordId, distance: f64) -> GraphEdge {
        GraphEdge::new(a, b, "SIBLING", distance, "test")
    }

    #[test]
    fn test_edge_lookup_is_order_independent() {
        let mut graph = InMemoryLinkGraph::new();
        graph.assert_edge(sibling_edge(5, 2, 0.1)).unwrap();

        let forward = graph.edge(2, 5, "SIBLING").unwrap();
        let backward = graph.edge(5, 2, "SIBLING").unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.a, 2);
        assert!(graph.edge(2, 5, "ID").is_none());
    }

    #[test]
    fn test_neighbours_filtered_by_kind() {
        let mut graph = InMemoryLinkGraph::new();
        graph.assert_edge(sibling_edge(1, 2, 0.1)).unwrap();
        graph.assert_edge(sibling_edge(1, 3, 0.2)).unwrap();
        graph
            .assert_edge(GraphEdge::new(1, 4, "ID", 0.05, "test"))
            .unwrap();

        assert_eq!(graph.neighbours(1, "SIBLING"), vec![2, 3]);
        assert_eq!(graph.neighbours(1, "ID"), vec![4]);
        assert!(graph.neighbours(9, "SIBLING").is_empty());
    }

    #[test]
    fn test_open_triangle_detection() {
        let mut graph = InMemoryLinkGraph::new();
        graph.assert_edge(sibling_edge(1, 2, 0.1)).unwrap();
        graph.assert_edge(sibling_edge(2, 3, 0.12)).unwrap();

        let triangles = graph.open_triangles("SIBLING").unwrap();
        assert_eq!(
            triangles,
            vec![OpenTriangle {
                x: 1,
                pivot: 2,
                z: 3
            }]
        );

        // Closing the triangle removes it.
        graph.assert_edge(sibling_edge(1, 3, 0.2)).unwrap();
        assert!(graph.open_triangles("SIBLING").unwrap().is_empty());
    }

    #[test]
    fn test_annotate_missing_edge_is_store_error() {
        let mut graph = InMemoryLinkGraph::new();
        let result = graph.annotate_edge(1, 2, "SIBLING", "deleted", "triangle");
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[test]
    fn test_assert_replaces_existing_edge() {
        let mut graph = InMemoryLinkGraph::new();
        graph.assert_edge(sibling_edge(1, 2, 0.3)).unwrap();
        graph.assert_edge(sibling_edge(1, 2, 0.1)).unwrap();
        assert_eq!(graph.len(), 1);
        let edge = graph.edge(1, 2, "SIBLING").unwrap();
        assert!((edge.distance - 0.1).abs() < f64::EPSILON);
    }
}
