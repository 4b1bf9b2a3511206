/// The end-to-end integration and diffusion pipeline.
///
/// [`integrate`] drives candidate generation → feature comparison →
/// classification → community partitioning → fusion for one configuration.
/// [`run_diffusion`] compiles a model against one graph, executes the run
/// batch, and aggregates. [`run_pipeline`] chains both plus a graph-property
/// summary, mirroring how the pieces are meant to compose.
///
/// Every strategy named by the configuration is resolved before any
/// expensive work starts, so configuration errors surface immediately and
/// nothing is partially applied.
use crate::analysis::{AggregateError, AggregateStatistics, aggregate};
use crate::blocking::{CandidatePair, build_blockers, collect_candidates};
use crate::classify::{build_classifier, matched_pairs};
use crate::communities::{EntityCluster, build_detector, partition};
use crate::comparison::{build_comparators, compute_features};
use crate::config::{ConfigurationError, FusionConfig, SchemaError};
use crate::fusion::{FusionWarning, fuse_all};
use crate::graph::{AttributedGraph, GraphBuildError};
use crate::metrics::{GraphProperties, graph_properties};
use crate::model::DiffusionModelSpec;
use crate::records::RecordTable;
use crate::simulate::{SimulationConfig, SimulationRun, compile};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Any failure the pipeline can surface to a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A configuration-shape error (unknown strategy, malformed rule or
    /// model definition).
    Configuration(ConfigurationError),
    /// A rule referenced an attribute absent from a record table.
    Schema(SchemaError),
    /// Graph construction or composition failed.
    Graph(GraphBuildError),
    /// Aggregation over a degenerate run batch.
    Aggregate(AggregateError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Configuration(err) => write!(f, "configuration error: {err}"),
            PipelineError::Schema(err) => write!(f, "schema error: {err}"),
            PipelineError::Graph(err) => write!(f, "graph error: {err}"),
            PipelineError::Aggregate(err) => write!(f, "aggregation error: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Configuration(err) => Some(err),
            PipelineError::Schema(err) => Some(err),
            PipelineError::Graph(err) => Some(err),
            PipelineError::Aggregate(err) => Some(err),
        }
    }
}

impl From<ConfigurationError> for PipelineError {
    fn from(err: ConfigurationError) -> Self {
        PipelineError::Configuration(err)
    }
}

impl From<SchemaError> for PipelineError {
    fn from(err: SchemaError) -> Self {
        PipelineError::Schema(err)
    }
}

impl From<GraphBuildError> for PipelineError {
    fn from(err: GraphBuildError) -> Self {
        PipelineError::Graph(err)
    }
}

impl From<AggregateError> for PipelineError {
    fn from(err: AggregateError) -> Self {
        PipelineError::Aggregate(err)
    }
}

// ---------------------------------------------------------------------------
// IntegrationOutput
// ---------------------------------------------------------------------------

/// The result of one integration: the fused graph plus the intermediate
/// match evidence.
#[derive(Debug, Clone)]
pub struct IntegrationOutput {
    /// The integrated graph.
    pub graph: AttributedGraph,
    /// Pairs the classifier labelled as matches.
    pub matches: Vec<CandidatePair>,
    /// Entity clusters the match graph partitioned into.
    pub clusters: Vec<EntityCluster>,
    /// Anomalies recovered during fusion.
    pub fusion_warnings: Vec<FusionWarning>,
}

/// Runs entity resolution and fusion for one configuration.
///
/// With one input graph the candidate pairs are drawn from the graph against
/// itself (deduplication); with two or more, linkage runs across the first
/// two graphs' record tables and fusion operates on the union of all inputs.
///
/// # Errors
///
/// - [`PipelineError::Graph`] — no input graphs.
/// - [`PipelineError::Configuration`] — an unknown or malformed strategy,
///   raised before any candidate is generated.
/// - [`PipelineError::Schema`] — a rule referencing an absent attribute.
pub fn integrate(
    graphs: &[AttributedGraph],
    config: &FusionConfig,
    training: Option<&[CandidatePair]>,
) -> Result<IntegrationOutput, PipelineError> {
    if graphs.is_empty() {
        return Err(GraphBuildError::NoInputGraphs.into());
    }

    // Resolve every named strategy up front; nothing below can fail with a
    // configuration error once work begins.
    let blockers = build_blockers(&config.blocking)?;
    let comparators = build_comparators(&config.comparison)?;
    let mut classifier = build_classifier(&config.classifier)?;
    let detector = build_detector(&config.community)?;

    let left = RecordTable::from_graph("graph_0", &graphs[0]);
    let right = graphs
        .get(1)
        .map(|graph| RecordTable::from_graph("graph_1", graph));

    let candidates = collect_candidates(&blockers, &left, right.as_ref())?;
    let features = compute_features(&comparators, &candidates, &left, right.as_ref())?;

    classifier.fit(&features, training)?;
    let labels = classifier.predict(&features);
    let matches = matched_pairs(&features, &labels);

    tracing::debug!(
        candidates = candidates.len(),
        matches = matches.len(),
        "classified candidate pairs"
    );

    let clusters = partition(&matches, detector.as_ref());
    let fused = fuse_all(graphs, &clusters)?;

    Ok(IntegrationOutput {
        graph: fused.graph,
        matches,
        clusters,
        fusion_warnings: fused.warnings,
    })
}

// ---------------------------------------------------------------------------
// Diffusion driving
// ---------------------------------------------------------------------------

/// A run batch plus its aggregate statistics for one graph.
#[derive(Debug, Clone)]
pub struct DiffusionResult {
    /// The independent stochastic trials.
    pub runs: Vec<SimulationRun>,
    /// Peak/final statistics averaged over the trials.
    pub statistics: AggregateStatistics,
}

/// Compiles `spec` against `graph`, executes `run_count` trials, and
/// aggregates.
///
/// # Errors
///
/// - [`PipelineError::Configuration`] — malformed model definition, raised
///   at model-build time before any run executes.
/// - [`PipelineError::Aggregate`] — zero runs requested or a zero-node
///   graph.
pub fn run_diffusion(
    graph: &AttributedGraph,
    spec: &DiffusionModelSpec,
    run_count: usize,
    config: &SimulationConfig,
) -> Result<DiffusionResult, PipelineError> {
    let model = compile(spec, graph)?;
    let runs = model.run_many(run_count, config)?;
    let statistics = aggregate(&runs, model.statuses(), graph.node_count())?;
    Ok(DiffusionResult { runs, statistics })
}

/// Runs one [`DiffusionModelSpec`] over several graphs with a shared
/// definition, one result per graph.
///
/// A failing graph becomes an `Err` entry in the output — a distinguishable
/// placeholder — while the remaining graphs still produce results.
pub fn multi_graph_diffusion(
    graphs: &[AttributedGraph],
    spec: &DiffusionModelSpec,
    run_count: usize,
    config: &SimulationConfig,
) -> Vec<Result<DiffusionResult, PipelineError>> {
    graphs
        .iter()
        .enumerate()
        .map(|(index, graph)| {
            let result = run_diffusion(graph, spec, run_count, config);
            if let Err(err) = &result {
                tracing::warn!(graph_index = index, error = %err, "diffusion failed for graph");
            }
            result
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

/// Everything one pipeline invocation produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The integration stage's output.
    pub integration: IntegrationOutput,
    /// The diffusion stage's output, run on the integrated graph.
    pub diffusion: DiffusionResult,
    /// Property summary of the integrated graph.
    pub properties: GraphProperties,
}

/// The whole chain: integrate, then simulate diffusion over the integrated
/// graph, then summarize.
///
/// # Errors
///
/// Any stage's error propagates; see [`integrate`] and [`run_diffusion`].
pub fn run_pipeline(
    graphs: &[AttributedGraph],
    fusion_config: &FusionConfig,
    training: Option<&[CandidatePair]>,
    spec: &DiffusionModelSpec,
    run_count: usize,
    simulation_config: &SimulationConfig,
) -> Result<PipelineOutput, PipelineError> {
    let integration = integrate(graphs, fusion_config, training)?;
    let diffusion = run_diffusion(&integration.graph, spec, run_count, simulation_config)?;
    let properties = graph_properties(&integration.graph);
    Ok(PipelineOutput {
        integration,
        diffusion,
        properties,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::config::{BlockingRule, ClassifierSpec, CommunitySpec, ComparisonRule};
    use crate::graph::{EdgeSpec, NodeRecord};
    use crate::simulate::Termination;

    /// Two 5-node graphs sharing two records under the `ssid` key.
    fn two_overlapping_graphs() -> Vec<AttributedGraph> {
        let left_nodes: Vec<NodeRecord> = (0..5)
            .map(|i| NodeRecord::new(format!("a{i}")).with_attr("ssid", format!("s{i}")))
            .collect();
        let right_nodes: Vec<NodeRecord> = (0..5)
            .map(|i| NodeRecord::new(format!("b{i}")).with_attr("ssid", format!("s{}", i + 3)))
            .collect();
        // s3 and s4 appear on both sides: a3–b0 and a4–b1 denote the same
        // entities.
        let left_edges = vec![EdgeSpec::new("a0", "a1"), EdgeSpec::new("a3", "a4")];
        let right_edges = vec![EdgeSpec::new("b0", "b1"), EdgeSpec::new("b2", "b3")];
        vec![
            AttributedGraph::build(left_nodes, left_edges).expect("left builds"),
            AttributedGraph::build(right_nodes, right_edges).expect("right builds"),
        ]
    }

    fn exact_ssid_config() -> FusionConfig {
        FusionConfig {
            blocking: vec![BlockingRule::exact("ssid")],
            comparison: vec![ComparisonRule::exact("ssid")],
            classifier: ClassifierSpec::threshold(1.0),
            community: CommunitySpec::default(),
        }
    }

    #[test]
    fn cross_graph_duplicates_fuse_into_eight_nodes() {
        let graphs = two_overlapping_graphs();
        let output = integrate(&graphs, &exact_ssid_config(), None).expect("integrates");

        assert_eq!(output.matches.len(), 2, "two shared records matched");
        assert_eq!(output.clusters.len(), 2);
        assert!(output.fusion_warnings.is_empty());
        assert_eq!(output.graph.node_count(), 8, "10 nodes minus 2 merged");
    }

    #[test]
    fn no_input_graphs_is_an_error() {
        let err = integrate(&[], &exact_ssid_config(), None).expect_err("no graphs");
        assert_eq!(err, PipelineError::Graph(GraphBuildError::NoInputGraphs));
    }

    #[test]
    fn configuration_errors_surface_before_any_work() {
        let graphs = two_overlapping_graphs();
        let mut config = exact_ssid_config();
        config.classifier.strategy = "svm".to_owned();
        // The comparison rule also references a missing attribute; the
        // configuration error must win because strategies resolve first.
        config.comparison = vec![ComparisonRule::exact("missing")];

        let err = integrate(&graphs, &config, None).expect_err("bad classifier");
        assert_eq!(
            err,
            PipelineError::Configuration(ConfigurationError::UnknownClassifier("svm".to_owned()))
        );
    }

    #[test]
    fn schema_errors_carry_the_offending_table() {
        let graphs = two_overlapping_graphs();
        let mut config = exact_ssid_config();
        config.comparison = vec![ComparisonRule::exact("postcode")];
        let err = integrate(&graphs, &config, None).expect_err("bad attribute");
        assert!(matches!(err, PipelineError::Schema(ref schema) if schema.attribute == "postcode"));
    }

    #[test]
    fn single_graph_deduplicates_against_itself() {
        let nodes = vec![
            NodeRecord::new("x1").with_attr("name", "Ann"),
            NodeRecord::new("x2").with_attr("name", "Ann"),
            NodeRecord::new("y").with_attr("name", "Bob"),
        ];
        let graph = AttributedGraph::build(nodes, vec![EdgeSpec::new("x2", "y")]).expect("builds");
        let config = FusionConfig {
            blocking: vec![BlockingRule::exact("name")],
            comparison: vec![ComparisonRule::exact("name")],
            classifier: ClassifierSpec::threshold(1.0),
            community: CommunitySpec::default(),
        };
        let output = integrate(std::slice::from_ref(&graph), &config, None).expect("integrates");

        assert_eq!(output.graph.node_count(), 2);
        assert!(output.graph.has_edge("x1", "y"), "duplicate's edge re-homed");
    }

    #[test]
    fn full_pipeline_produces_runs_statistics_and_properties() {
        let graphs = two_overlapping_graphs();
        let spec = DiffusionModelSpec::sir(1.0, 1.0, 0.2);
        let config = SimulationConfig {
            max_steps: 50,
            seed: Some(11),
            seed_nodes: None,
        };
        let output = run_pipeline(&graphs, &exact_ssid_config(), None, &spec, 5, &config)
            .expect("pipeline runs");

        assert_eq!(output.properties.node_count, 8);
        assert_eq!(output.diffusion.runs.len(), 5);
        assert_eq!(output.diffusion.statistics.len(), 6, "three statuses");

        for run in &output.diffusion.runs {
            for step in 0..run.steps() {
                let total: usize = run.counts.iter().map(|series| series[step]).sum();
                assert_eq!(total, 8, "conservation on the integrated graph");
            }
        }
    }

    #[test]
    fn multi_graph_diffusion_reports_per_graph_placeholders() {
        let good = AttributedGraph::build(
            vec![NodeRecord::new("a"), NodeRecord::new("b")],
            vec![EdgeSpec::new("a", "b")],
        )
        .expect("builds");
        let empty = AttributedGraph::build(vec![], vec![]).expect("builds");

        let spec = DiffusionModelSpec::sir(0.5, 0.5, 0.5);
        let config = SimulationConfig {
            max_steps: 20,
            seed: Some(3),
            seed_nodes: None,
        };
        let results = multi_graph_diffusion(&[good, empty], &spec, 3, &config);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok(), "healthy graph succeeds");
        assert!(
            matches!(
                results[1],
                Err(PipelineError::Aggregate(AggregateError::EmptyGraph))
            ),
            "failing graph becomes a distinguishable placeholder"
        );
    }

    #[test]
    fn certain_sir_on_integrated_graph_reaches_absorbing_state() {
        // End-to-end: fuse, then drive an always-fires SIR to absorption.
        let graphs = two_overlapping_graphs();
        let spec = DiffusionModelSpec::sir(1.0, 1.0, 0.25);
        let config = SimulationConfig {
            max_steps: 100,
            seed: Some(5),
            seed_nodes: None,
        };
        let output = run_pipeline(&graphs, &exact_ssid_config(), None, &spec, 4, &config)
            .expect("pipeline runs");

        for run in &output.diffusion.runs {
            assert_eq!(run.termination, Termination::AbsorbingState);
        }
    }
}
