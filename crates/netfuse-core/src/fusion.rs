/// Graph fusion: contracting entity clusters into canonical nodes.
///
/// Given a base graph (or an ordered list of graphs, unioned first via
/// [`compose`]) and the entity clusters from partitioning, fusion contracts
/// each cluster's members into its representative: edges are re-homed to the
/// representative, self-loops introduced by contraction are dropped, and
/// parallel edges collapse under the simple-graph rule.
///
/// # Attribute policy
///
/// Attributes merge with precedence: the representative's own attributes
/// always win, and attribute keys the representative lacks are filled from
/// later members in cluster order. Cross-cluster edge sets are independent of
/// contraction order; only this attribute provenance is order-sensitive.
///
/// # Recovery
///
/// A cluster member absent from the base graph is skipped with a warning
/// rather than failing the fusion; a missing representative skips the whole
/// cluster.
use std::collections::HashMap;

use crate::communities::EntityCluster;
use crate::graph::{AttributedGraph, GraphBuildError, NodeRecord, compose};

// ---------------------------------------------------------------------------
// FusionWarning
// ---------------------------------------------------------------------------

/// Non-fatal anomaly recovered during fusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FusionWarning {
    /// A cluster member was absent from the base graph and was skipped.
    MissingClusterMember {
        /// The cluster's representative.
        representative: String,
        /// The absent member.
        member: String,
    },
    /// A cluster's representative was absent from the base graph; the whole
    /// cluster was skipped.
    MissingRepresentative {
        /// The absent representative.
        representative: String,
    },
}

impl std::fmt::Display for FusionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionWarning::MissingClusterMember {
                representative,
                member,
            } => {
                write!(
                    f,
                    "cluster member {member:?} is absent from the base graph; \
                     skipped (representative {representative:?})"
                )
            }
            FusionWarning::MissingRepresentative { representative } => {
                write!(
                    f,
                    "cluster representative {representative:?} is absent from the base graph; \
                     cluster skipped"
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FusionOutput
// ---------------------------------------------------------------------------

/// The result of a fusion: the integrated graph plus recovered anomalies.
#[derive(Debug, Clone)]
pub struct FusionOutput {
    /// The integrated graph. Immutable once produced; the diffusion
    /// simulator only ever reads it.
    pub graph: AttributedGraph,
    /// Warnings for skipped cluster members or clusters.
    pub warnings: Vec<FusionWarning>,
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// Contracts each cluster of `clusters` into its representative inside
/// `base`, returning a fresh integrated graph.
///
/// Clusters are expected to be pairwise disjoint, as produced by
/// [`crate::communities::partition`]; members of a later cluster that were
/// already contracted by an earlier one are left where the earlier
/// contraction put them.
pub fn fuse(base: &AttributedGraph, clusters: &[EntityCluster]) -> FusionOutput {
    let mut warnings = Vec::new();

    // canonical[id] = representative the node is contracted into.
    let mut canonical: HashMap<String, String> = HashMap::new();
    // absorbed[rep] = members merged into rep, in cluster order.
    let mut absorbed: HashMap<String, Vec<String>> = HashMap::new();

    for cluster in clusters {
        let Some(representative) = cluster.representative() else {
            continue;
        };
        if !base.contains(representative) {
            tracing::debug!(representative, "fusion: representative missing, cluster skipped");
            warnings.push(FusionWarning::MissingRepresentative {
                representative: representative.to_owned(),
            });
            continue;
        }
        // The representative itself may have been absorbed by an earlier
        // cluster; resolve it so chains stay flat.
        let target = canonical
            .get(representative)
            .cloned()
            .unwrap_or_else(|| representative.to_owned());

        for member in &cluster.members[1..] {
            if !base.contains(member) {
                tracing::debug!(member = member.as_str(), "fusion: cluster member missing, skipped");
                warnings.push(FusionWarning::MissingClusterMember {
                    representative: representative.to_owned(),
                    member: member.clone(),
                });
                continue;
            }
            if canonical.contains_key(member) || member == &target {
                continue;
            }
            canonical.insert(member.clone(), target.clone());
            absorbed.entry(target.clone()).or_default().push(member.clone());
        }
    }

    // Node pass: keep unmapped nodes, merging absorbed members' attributes
    // into their representative with precedence.
    let mut nodes = Vec::with_capacity(base.node_count() - canonical.len());
    for record in base.records() {
        if canonical.contains_key(&record.id) {
            continue;
        }
        let mut attrs = record.attrs.clone();
        if let Some(members) = absorbed.get(&record.id) {
            for member in members {
                let Some(member_record) = base.record(member) else {
                    continue;
                };
                for (key, value) in &member_record.attrs {
                    if !attrs.contains_key(key) {
                        attrs.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        nodes.push(NodeRecord {
            id: record.id.clone(),
            attrs,
        });
    }

    // Edge pass: re-home endpoints, dropping self-loops introduced by
    // contraction (pre-existing self-loops survive). Node ids come from an
    // already-validated graph, so insertion cannot fail.
    let mut graph = AttributedGraph::empty();
    for record in nodes {
        graph.insert_record(record);
    }
    let resolve = |id: &str| -> String {
        canonical.get(id).cloned().unwrap_or_else(|| id.to_owned())
    };
    for (source, target, attrs) in base.edges() {
        let new_source = resolve(source);
        let new_target = resolve(target);
        if new_source == new_target && source != target {
            continue;
        }
        let (Some(a), Some(b)) = (graph.node_index(&new_source), graph.node_index(&new_target))
        else {
            continue;
        };
        graph.merge_edge(a, b, attrs.clone());
    }

    FusionOutput { graph, warnings }
}

/// Unions an ordered list of graphs and fuses the clusters into the result.
///
/// # Errors
///
/// Returns [`GraphBuildError::NoInputGraphs`] when `graphs` is empty.
pub fn fuse_all(
    graphs: &[AttributedGraph],
    clusters: &[EntityCluster],
) -> Result<FusionOutput, GraphBuildError> {
    let base = compose(graphs)?;
    Ok(fuse(&base, clusters))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::graph::EdgeSpec;
    use serde_json::json;

    fn cluster(members: &[&str]) -> EntityCluster {
        EntityCluster {
            members: members.iter().map(|m| (*m).to_owned()).collect(),
        }
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> AttributedGraph {
        AttributedGraph::build(
            nodes.iter().map(|id| NodeRecord::new(*id)).collect(),
            edges
                .iter()
                .map(|(a, b)| EdgeSpec::new(*a, *b))
                .collect(),
        )
        .expect("builds")
    }

    #[test]
    fn fusing_with_no_clusters_is_identity() {
        let base = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let fused = fuse(&base, &[]);
        assert!(fused.warnings.is_empty());
        assert_eq!(fused.graph.node_count(), 3);
        assert_eq!(fused.graph.edge_count(), 2);
        for id in ["a", "b", "c"] {
            assert!(fused.graph.contains(id));
        }
    }

    #[test]
    fn contraction_rehomes_edges_and_drops_contraction_loops() {
        // b and c denote one entity with b as representative: the b–c edge
        // must vanish and c's edge to d must re-home onto b.
        let base = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d")],
        );
        let fused = fuse(&base, &[cluster(&["b", "c"])]);

        assert!(fused.warnings.is_empty());
        assert_eq!(fused.graph.node_count(), 3);
        assert!(!fused.graph.contains("c"));
        assert!(fused.graph.has_edge("a", "b"));
        assert!(fused.graph.has_edge("b", "d"), "c's edge re-homed to b");
        assert!(!fused.graph.has_edge("b", "b"), "contraction loop dropped");
        assert_eq!(fused.graph.edge_count(), 2);
    }

    #[test]
    fn parallel_edges_collapse_after_contraction() {
        // Both b and c connect to a; after contracting {b, c} only one
        // a–b edge remains.
        let base = graph(&["a", "b", "c"], &[("a", "b"), ("a", "c")]);
        let fused = fuse(&base, &[cluster(&["b", "c"])]);
        assert_eq!(fused.graph.node_count(), 2);
        assert_eq!(fused.graph.edge_count(), 1);
        assert!(fused.graph.has_edge("a", "b"));
    }

    #[test]
    fn representative_is_the_first_member() {
        let base = graph(&["x", "y"], &[("x", "y")]);
        let fused = fuse(&base, &[cluster(&["y", "x"])]);
        assert!(fused.graph.contains("y"), "first member survives");
        assert!(!fused.graph.contains("x"));
    }

    #[test]
    fn attributes_merge_with_precedence() {
        let base = AttributedGraph::build(
            vec![
                NodeRecord::new("rep").with_attr("name", "Ann"),
                NodeRecord::new("dup")
                    .with_attr("name", "Ann B.")
                    .with_attr("city", "Lund"),
            ],
            vec![],
        )
        .expect("builds");
        let fused = fuse(&base, &[cluster(&["rep", "dup"])]);

        let record = fused.graph.record("rep").expect("representative kept");
        assert_eq!(
            record.attrs.get("name"),
            Some(&json!("Ann")),
            "representative's value wins"
        );
        assert_eq!(
            record.attrs.get("city"),
            Some(&json!("Lund")),
            "missing key filled from the absorbed member"
        );
    }

    #[test]
    fn missing_member_is_skipped_with_warning() {
        let base = graph(&["a", "b"], &[("a", "b")]);
        let fused = fuse(&base, &[cluster(&["a", "stale"])]);
        assert_eq!(
            fused.warnings,
            vec![FusionWarning::MissingClusterMember {
                representative: "a".to_owned(),
                member: "stale".to_owned(),
            }]
        );
        assert_eq!(fused.graph.node_count(), 2, "nothing contracted");
    }

    #[test]
    fn missing_representative_skips_the_cluster() {
        let base = graph(&["a", "b"], &[("a", "b")]);
        let fused = fuse(&base, &[cluster(&["stale", "a", "b"])]);
        assert_eq!(
            fused.warnings,
            vec![FusionWarning::MissingRepresentative {
                representative: "stale".to_owned(),
            }]
        );
        assert_eq!(fused.graph.node_count(), 2);
        assert_eq!(fused.graph.edge_count(), 1);
    }

    #[test]
    fn pre_existing_self_loop_survives() {
        let base = graph(&["a", "b", "c"], &[("a", "a"), ("b", "c")]);
        let fused = fuse(&base, &[cluster(&["b", "c"])]);
        assert!(fused.graph.has_edge("a", "a"));
        assert!(!fused.graph.has_edge("b", "b"));
    }

    #[test]
    fn fuse_all_unions_then_contracts() {
        // Two graphs sharing no identifiers; one cluster spanning both.
        let g1 = graph(&["a", "b"], &[("a", "b")]);
        let g2 = graph(&["c", "d"], &[("c", "d")]);
        let fused = fuse_all(&[g1, g2], &[cluster(&["b", "c"])]).expect("fuses");

        assert_eq!(fused.graph.node_count(), 3);
        assert!(fused.graph.has_edge("a", "b"));
        assert!(fused.graph.has_edge("b", "d"), "cross-graph edge re-homed");
    }

    #[test]
    fn fuse_all_without_graphs_fails() {
        let err = fuse_all(&[], &[]).expect_err("no inputs");
        assert_eq!(err, GraphBuildError::NoInputGraphs);
    }

    #[test]
    fn cross_cluster_edges_are_preserved() {
        // Two clusters with an edge between their members: the integrated
        // graph must carry the corresponding representative edge.
        let base = graph(
            &["a1", "a2", "b1", "b2"],
            &[("a1", "a2"), ("a2", "b2"), ("b1", "b2")],
        );
        let fused = fuse(&base, &[cluster(&["a1", "a2"]), cluster(&["b1", "b2"])]);
        assert_eq!(fused.graph.node_count(), 2);
        assert_eq!(fused.graph.edge_count(), 1);
        assert!(fused.graph.has_edge("a1", "b1"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        /// Builds a graph over `n` nodes (`n0`, `n1`, ...) with the given
        /// edge index pairs, plus two disjoint clusters carved from the
        /// front of the node list.
        fn fixture(
            n: usize,
            edge_indices: &[(usize, usize)],
            split: usize,
        ) -> (AttributedGraph, Vec<EntityCluster>) {
            let names: Vec<String> = (0..n).map(|i| format!("n{i}")).collect();
            let nodes = names.iter().map(NodeRecord::new).collect();
            let edges = edge_indices
                .iter()
                .map(|&(a, b)| EdgeSpec::new(names[a % n].clone(), names[b % n].clone()))
                .collect();
            let graph = AttributedGraph::build(nodes, edges).expect("builds");

            let clusters = vec![
                EntityCluster {
                    members: names[..split].to_vec(),
                },
                EntityCluster {
                    members: names[split..split * 2].to_vec(),
                },
            ];
            (graph, clusters)
        }

        proptest! {
            /// Contraction preserves cross-cluster incidence: the fused
            /// graph has an edge between two representatives exactly when
            /// some pre-fusion edge joined their clusters.
            #[test]
            fn cross_cluster_incidence_preserved(
                edge_indices in proptest::collection::vec((0usize..8, 0usize..8), 0..24),
                split in 1usize..4,
            ) {
                let n = 8;
                let (base, clusters) = fixture(n, &edge_indices, split);
                let fused = fuse(&base, &clusters);

                // Every node maps to its representative.
                let mut rep_of: HashMap<&str, &str> = HashMap::new();
                for cluster in &clusters {
                    let rep = cluster.representative().expect("non-empty");
                    for member in &cluster.members {
                        rep_of.insert(member, rep);
                    }
                }

                let expected: BTreeSet<(String, String)> = base
                    .edges()
                    .map(|(s, t, _)| {
                        let a = (*rep_of.get(s).unwrap_or(&s)).to_owned();
                        let b = (*rep_of.get(t).unwrap_or(&t)).to_owned();
                        if a <= b { (a, b) } else { (b, a) }
                    })
                    .filter(|(a, b)| {
                        // Contraction loops disappear unless the original
                        // edge was already a self-loop.
                        a != b
                            || base.edges().any(|(s, t, _)| {
                                s == t && rep_of.get(s).copied().unwrap_or(s) == a.as_str()
                            })
                    })
                    .collect();

                let actual: BTreeSet<(String, String)> = fused
                    .graph
                    .edges()
                    .map(|(s, t, _)| {
                        let (s, t) = (s.to_owned(), t.to_owned());
                        if s <= t { (s, t) } else { (t, s) }
                    })
                    .collect();

                prop_assert_eq!(actual, expected);

                // Node count drops by exactly the number of contracted
                // members present in the base graph.
                let contracted: usize = clusters
                    .iter()
                    .map(|c| c.members.len().saturating_sub(1))
                    .sum();
                prop_assert_eq!(fused.graph.node_count(), n - contracted);
            }
        }
    }
}
