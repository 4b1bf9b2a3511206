#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Entity resolution, graph fusion, and stochastic diffusion analysis over
//! attributed networks.
//!
//! The crate resolves duplicate entities across one or more attributed
//! graphs, contracts them into an integrated graph via
//! community-detection-based clustering, then simulates spreading processes
//! over the result and aggregates statistics across independent Monte Carlo
//! runs and across candidate fusion configurations.
//!
//! The stages compose left to right:
//!
//! ```text
//! blocking → comparison → classification → partitioning → fusion
//!     → model compilation → simulation → aggregation
//! ```
//!
//! [`pipeline::run_pipeline`] drives the whole chain for one configuration;
//! [`sweep::sweep`] repeats the integration stage over a configuration
//! product; [`pipeline::multi_graph_diffusion`] runs one model over several
//! graphs for structural before/after-fusion comparison.

pub mod analysis;
pub mod blocking;
pub mod classify;
pub mod communities;
pub mod comparison;
pub mod config;
pub mod fusion;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod records;
pub mod simulate;
pub mod sweep;
pub mod union_find;

pub use analysis::{
    AggregateError, AggregateStatistics, ComparisonTable, aggregate, average_stat_comparison,
    comparison_table, graph_property_comparison,
};
pub use blocking::{Blocker, CandidatePair, build_blockers, collect_candidates};
pub use classify::{Classifier, build_classifier, matched_pairs};
pub use communities::{
    CommunityDetector, DenseGraph, EntityCluster, build_detector, partition,
};
pub use comparison::{Comparator, FeatureBatch, build_comparators, compute_features, normalize};
pub use config::{
    BlockingRule, ClassifierSpec, CommunitySpec, ComparisonRule, ConfigurationError, FusionConfig,
    SchemaError,
};
pub use fusion::{FusionOutput, FusionWarning, fuse, fuse_all};
pub use graph::{
    AttrMap, AttributedGraph, EdgeSpec, GraphBuildError, NodeRecord, compose,
};
pub use metrics::{GraphProperties, graph_properties, is_connected};
pub use model::{CompartmentSpec, DiffusionModelSpec, SeedFraction, TransitionRule};
pub use pipeline::{
    DiffusionResult, IntegrationOutput, PipelineError, PipelineOutput, integrate,
    multi_graph_diffusion, run_diffusion, run_pipeline,
};
pub use records::RecordTable;
pub use simulate::{
    CompiledModel, SimulationConfig, SimulationRun, Termination, compile,
};
pub use sweep::{CombinationBuilder, SweepOutcome, sweep};
pub use union_find::UnionFind;

/// Returns the current version of the netfuse-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
