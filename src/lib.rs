//! # kinlink
//!
//! Probabilistic entity resolution for vital-event records.
//!
//! - **Matching**: composite fuzzy field distances over births, deaths, marriages
//! - **Linking**: threshold linkage over cross products or an external search index
//! - **Evaluation**: ground-truth classification and precision/recall/F-measure
//! - **Consistency**: open-triangle resolution and family bundle merging
//!
//! ## Quick Start
//!
//! ```rust
//! use kinlink::{
//!     AggregationPolicy, BigramJaccard, CancelToken, CompositeMeasure,
//!     ImputationPolicy, LinkageConfig, ThresholdLinker,
//! };
//! use kinlink::record::{birth, MemoryRecord, RecordType};
//! use std::sync::Arc;
//!
//! # fn main() -> kinlink::Result<()> {
//! let measure = Arc::new(CompositeMeasure::new(
//!     Arc::new(BigramJaccard),
//!     vec![birth::MOTHER_FORENAME, birth::MOTHER_MAIDEN_SURNAME],
//!     ImputationPolicy::One,
//!     AggregationPolicy::Mean,
//! )?);
//!
//! let linker = ThresholdLinker::new(
//!     measure,
//!     0.5,
//!     "SIBLING",
//!     "quickstart",
//!     LinkageConfig::default(),
//! )?;
//!
//! let records: Vec<Arc<MemoryRecord>> = vec![
//!     Arc::new(
//!         MemoryRecord::empty(1, RecordType::Birth)
//!             .with_field(birth::MOTHER_FORENAME, "MAJA")
//!             .with_field(birth::MOTHER_MAIDEN_SURNAME, "TJERNBERG"),
//!     ),
//!     Arc::new(
//!         MemoryRecord::empty(2, RecordType::Birth)
//!             .with_field(birth::MOTHER_FORENAME, "MAIA")
//!             .with_field(birth::MOTHER_MAIDEN_SURNAME, "TJERNBERG"),
//!     ),
//! ];
//!
//! let links = linker.link_cross_product(&records, &records, &CancelToken::new())?;
//! assert_eq!(links.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | `FieldMetric` impls | [`metric`] | per-field string distances |
//! | `CompositeMeasure` | [`measure`] | record-level distance with imputation |
//! | `FelligiSunterDistance` | [`measure`] | log-odds weighted variant |
//! | `ThresholdLinker` | [`linker`] | candidate sweep and link formation |
//! | `GroundTruthClassifier` | [`ground_truth`] | four-way pair verdicts |
//! | evaluation functions | [`evaluation`] | quality metrics, threshold sweeps |
//! | `LinkGraphStore` | [`graph`] | external link graph surface |
//! | `ClusterConsistencyResolver` | [`resolver`] | open-triangle decisions |
//! | `FamilyBundleMerger` | [`bundle`] | sibling family reconciliation |
//!
//! ## Design
//!
//! - **Records are external**: the crate sees them through the [`record::VitalRecord`]
//!   trait and never owns a record store
//! - **Policies are data**: imputation and aggregation variants are enums, not
//!   trait hierarchies
//! - **Decisions are explicit**: resolvers and mergers report every item they
//!   touch; nothing is silently skipped
//! - **No global state**: all tunables travel in [`LinkageConfig`] and
//!   [`ResolverConfig`] values
//!
//! ## Feature Flags
//!
//! ```toml
//! [dependencies]
//! kinlink = "0.1"                                      # parallel sweeps (default)
//! kinlink = { version = "0.1", default-features = false } # sequential only
//! ```

#![warn(missing_docs)]

pub mod bundle;
pub mod config;
mod error;
pub mod evaluation;
pub mod graph;
pub mod ground_truth;
pub mod linker;
pub mod measure;
pub mod metric;
pub mod record;
pub mod resolver;
pub mod search;

pub use bundle::{BundleOutcome, FamilyBundle, FamilyBundleMerger, OverlapFlag};
pub use config::{CancelToken, LinkageConfig};
pub use error::{Error, Result};
pub use evaluation::{
    best_by_f_measure, best_link_per_query, count_true_links, evaluate_links, sweep_thresholds,
    LinkageQuality, ThresholdPoint,
};
pub use graph::{GraphEdge, InMemoryLinkGraph, LinkGraphStore, OpenTriangle};
pub use ground_truth::{AbsentGroundTruthPolicy, GroundTruthClassifier, LinkStatus};
pub use linker::{Link, ThresholdLinker, ViabilityCheck};
pub use measure::{AggregationPolicy, CompositeMeasure, FelligiSunterDistance, ImputationPolicy};
pub use metric::{
    validate_triangle_inequality, BigramJaccard, FieldMetric, JensenShannon, Levenshtein,
    TriangleViolation,
};
pub use record::{FieldIndex, RecordId, RecordType, VitalRecord};
pub use resolver::{
    apply_decisions, ClusterConsistencyResolver, ResolutionReport, ResolverConfig,
    TriangleDecision,
};
pub use search::{LinearScanFactory, LinearScanIndex, RangeMatch, SearchIndex, SearchIndexFactory};
