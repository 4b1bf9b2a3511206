/// Configuration sweeping: enumerating fusion configurations and driving
/// the integration pipeline once per configuration.
///
/// [`CombinationBuilder`] enumerates the cartesian product of blocking ×
/// comparison × classifier × community setups; [`sweep`] folds the
/// enumerated configurations into integrated graphs. Each call produces a
/// fresh output collection — no state accumulates across calls, so sweeps
/// can be re-run or sharded without order-dependent side effects.
use crate::blocking::CandidatePair;
use crate::config::{
    BlockingRule, ClassifierSpec, CommunitySpec, ComparisonRule, FusionConfig,
};
use crate::graph::AttributedGraph;
use crate::pipeline::{IntegrationOutput, PipelineError, integrate};

// ---------------------------------------------------------------------------
// CombinationBuilder
// ---------------------------------------------------------------------------

/// Enumerates fusion configurations as a cartesian product of setup lists.
#[derive(Debug, Clone, Default)]
pub struct CombinationBuilder {
    /// Candidate blocking-rule sets.
    pub blocking_setups: Vec<Vec<BlockingRule>>,
    /// Candidate comparison-rule sets.
    pub comparison_setups: Vec<Vec<ComparisonRule>>,
    /// Candidate classifiers.
    pub classifiers: Vec<ClassifierSpec>,
    /// Candidate community algorithms.
    pub communities: Vec<CommunitySpec>,
}

impl CombinationBuilder {
    /// Returns every combination, ordered with the blocking setup varying
    /// slowest and the community algorithm fastest.
    pub fn combinations(&self) -> Vec<FusionConfig> {
        let mut configs = Vec::with_capacity(
            self.blocking_setups.len()
                * self.comparison_setups.len()
                * self.classifiers.len()
                * self.communities.len(),
        );
        for blocking in &self.blocking_setups {
            for comparison in &self.comparison_setups {
                for classifier in &self.classifiers {
                    for community in &self.communities {
                        configs.push(FusionConfig {
                            blocking: blocking.clone(),
                            comparison: comparison.clone(),
                            classifier: classifier.clone(),
                            community: community.clone(),
                        });
                    }
                }
            }
        }
        configs
    }
}

// ---------------------------------------------------------------------------
// Sweeping
// ---------------------------------------------------------------------------

/// One sweep entry: the configuration position plus its outcome.
///
/// Failures stay in the output as distinguishable placeholders; a sweep that
/// partially fails still returns results for the succeeding configurations.
#[derive(Debug)]
pub struct SweepOutcome {
    /// Position of the configuration in the swept list.
    pub config_index: usize,
    /// The integration result or the error that stopped it.
    pub result: Result<IntegrationOutput, PipelineError>,
}

/// Drives [`integrate`] once per configuration over the same input graphs.
///
/// Returns a fresh collection per call, one entry per configuration in
/// order.
pub fn sweep(
    configs: &[FusionConfig],
    graphs: &[AttributedGraph],
    training: Option<&[CandidatePair]>,
) -> Vec<SweepOutcome> {
    configs
        .iter()
        .enumerate()
        .map(|(config_index, config)| {
            let result = integrate(graphs, config, training);
            if let Err(err) = &result {
                tracing::warn!(config_index, error = %err, "sweep configuration failed");
            }
            SweepOutcome {
                config_index,
                result,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::config::ConfigurationError;
    use crate::graph::{EdgeSpec, NodeRecord};

    fn duplicate_heavy_graph() -> AttributedGraph {
        let nodes = vec![
            NodeRecord::new("x1").with_attr("name", "Ann").with_attr("city", "Lund"),
            NodeRecord::new("x2").with_attr("name", "Ann").with_attr("city", "Lund"),
            NodeRecord::new("y1").with_attr("name", "Bob").with_attr("city", "Ystad"),
            NodeRecord::new("y2").with_attr("name", "Bob").with_attr("city", "Malmo"),
            NodeRecord::new("z").with_attr("name", "Cyd").with_attr("city", "Lund"),
        ];
        let edges = vec![
            EdgeSpec::new("x1", "y1"),
            EdgeSpec::new("x2", "z"),
            EdgeSpec::new("y2", "z"),
        ];
        AttributedGraph::build(nodes, edges).expect("builds")
    }

    fn builder() -> CombinationBuilder {
        CombinationBuilder {
            blocking_setups: vec![
                vec![BlockingRule::exact("name")],
                vec![BlockingRule::full()],
            ],
            comparison_setups: vec![vec![
                ComparisonRule::exact("name"),
                ComparisonRule::exact("city"),
            ]],
            classifiers: vec![
                ClassifierSpec::threshold(1.0),
                ClassifierSpec {
                    strategy: "threshold".to_owned(),
                    threshold: Some(0.5),
                    require_all: Some(false),
                },
            ],
            communities: vec![CommunitySpec::default()],
        }
    }

    #[test]
    fn combinations_enumerate_the_cartesian_product() {
        let configs = builder().combinations();
        assert_eq!(configs.len(), 4, "2 blocking × 1 comparison × 2 classifiers × 1 community");

        // Blocking varies slowest.
        assert_eq!(configs[0].blocking, configs[1].blocking);
        assert_ne!(configs[0].blocking, configs[2].blocking);
        // Classifier varies within one blocking setup.
        assert_ne!(configs[0].classifier, configs[1].classifier);
    }

    #[test]
    fn sweeping_four_configs_yields_four_valid_graphs() {
        let graph = duplicate_heavy_graph();
        let configs = builder().combinations();
        let outcomes = sweep(&configs, std::slice::from_ref(&graph), None);

        assert_eq!(outcomes.len(), 4);
        for outcome in &outcomes {
            let output = outcome
                .result
                .as_ref()
                .expect("every configuration succeeds");
            // Fusion invariants: node count shrinks by the contracted
            // members, never below 1, and the graph stays simple.
            assert!(output.graph.node_count() <= graph.node_count());
            assert!(output.graph.node_count() >= 1);
            assert!(output.graph.edge_count() <= graph.edge_count());
            for cluster in &output.clusters {
                assert!(!cluster.members.is_empty());
            }
        }

        // The strict exact-agreement configs merge only the exact duplicate
        // pair; the mean-threshold configs additionally merge y1/y2.
        let strict = outcomes[0].result.as_ref().expect("ok");
        assert_eq!(strict.graph.node_count(), 4, "x1/x2 merged");
        let lenient = outcomes[1].result.as_ref().expect("ok");
        assert_eq!(lenient.graph.node_count(), 3, "x pair and y pair merged");
    }

    #[test]
    fn sweep_failures_are_placeholders_not_aborts() {
        let graph = duplicate_heavy_graph();
        let mut configs = builder().combinations();
        configs[1].classifier.strategy = "ecm".to_owned();

        let outcomes = sweep(&configs, std::slice::from_ref(&graph), None);
        assert_eq!(outcomes.len(), 4, "failing entry still present");
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(PipelineError::Configuration(ConfigurationError::UnknownClassifier(_)))
        ));
        assert!(outcomes[2].result.is_ok());
        assert_eq!(outcomes[1].config_index, 1);
    }

    #[test]
    fn repeated_sweeps_are_independent() {
        let graph = duplicate_heavy_graph();
        let configs = builder().combinations();
        let first = sweep(&configs, std::slice::from_ref(&graph), None);
        let second = sweep(&configs, std::slice::from_ref(&graph), None);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            let ga = &a.result.as_ref().expect("ok").graph;
            let gb = &b.result.as_ref().expect("ok").graph;
            assert_eq!(ga.node_count(), gb.node_count());
            assert_eq!(ga.edge_count(), gb.edge_count());
        }
    }
}
