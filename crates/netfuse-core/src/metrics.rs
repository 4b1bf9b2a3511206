/// Graph-property summaries: counts, connectivity, and centrality measures.
///
/// Computed on demand from an [`AttributedGraph`] and exposed read-only for
/// external analysis and visualization layers; nothing in this module
/// renders anything. Centrality definitions follow the standard normalized
/// forms: degree centrality is degree over `n - 1`, closeness uses the
/// Wasserman–Faust component scaling so disconnected graphs stay
/// well-defined, and betweenness is Brandes' algorithm with the usual
/// `1 / ((n - 1)(n - 2))` normalization.
use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::graph::AttributedGraph;

// ---------------------------------------------------------------------------
// GraphProperties
// ---------------------------------------------------------------------------

/// A read-only property summary of one graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphProperties {
    /// Number of nodes.
    pub node_count: usize,
    /// Number of edges.
    pub edge_count: usize,
    /// `true` when every node is reachable from every other. An empty graph
    /// reports `false`.
    pub connected: bool,
    /// Normalized degree centrality per node.
    pub degree_centrality: BTreeMap<String, f64>,
    /// Normalized betweenness centrality per node.
    pub betweenness_centrality: BTreeMap<String, f64>,
    /// Closeness centrality per node (Wasserman–Faust scaled).
    pub closeness_centrality: BTreeMap<String, f64>,
}

impl GraphProperties {
    /// Flattens the summary to scalar columns for comparison tables:
    /// counts, connectivity as 0/1, and the mean of each centrality.
    pub fn scalar_summary(&self) -> BTreeMap<String, f64> {
        let mean = |map: &BTreeMap<String, f64>| {
            if map.is_empty() {
                0.0
            } else {
                map.values().sum::<f64>() / map.len() as f64
            }
        };
        BTreeMap::from([
            ("num_nodes".to_owned(), self.node_count as f64),
            ("num_edges".to_owned(), self.edge_count as f64),
            ("connected".to_owned(), f64::from(u8::from(self.connected))),
            ("mean_degree_centrality".to_owned(), mean(&self.degree_centrality)),
            (
                "mean_betweenness_centrality".to_owned(),
                mean(&self.betweenness_centrality),
            ),
            (
                "mean_closeness_centrality".to_owned(),
                mean(&self.closeness_centrality),
            ),
        ])
    }
}

/// Computes the full property summary for a graph.
pub fn graph_properties(graph: &AttributedGraph) -> GraphProperties {
    let (ids, adjacency) = graph.dense_adjacency();
    GraphProperties {
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        connected: is_connected_dense(&adjacency),
        degree_centrality: degree_centrality_dense(&ids, &adjacency),
        betweenness_centrality: betweenness_dense(&ids, &adjacency),
        closeness_centrality: closeness_dense(&ids, &adjacency),
    }
}

/// Returns `true` when the graph is connected. Empty graphs report `false`;
/// a single node is connected.
pub fn is_connected(graph: &AttributedGraph) -> bool {
    let (_, adjacency) = graph.dense_adjacency();
    is_connected_dense(&adjacency)
}

// ---------------------------------------------------------------------------
// Dense implementations
// ---------------------------------------------------------------------------

fn is_connected_dense(adjacency: &[Vec<usize>]) -> bool {
    let n = adjacency.len();
    if n == 0 {
        return false;
    }
    let mut seen = vec![false; n];
    let mut queue = VecDeque::from([0usize]);
    seen[0] = true;
    let mut reached = 1usize;
    while let Some(v) = queue.pop_front() {
        for &w in &adjacency[v] {
            if !seen[w] {
                seen[w] = true;
                reached += 1;
                queue.push_back(w);
            }
        }
    }
    reached == n
}

fn degree_centrality_dense(ids: &[String], adjacency: &[Vec<usize>]) -> BTreeMap<String, f64> {
    let n = adjacency.len();
    if n <= 1 {
        return ids.iter().map(|id| (id.clone(), 1.0)).collect();
    }
    let scale = 1.0 / (n - 1) as f64;
    ids.iter()
        .zip(adjacency)
        .map(|(id, neighbors)| (id.clone(), neighbors.len() as f64 * scale))
        .collect()
}

/// BFS distances from `source`; unreachable nodes stay `None`.
fn bfs_distances(adjacency: &[Vec<usize>], source: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; adjacency.len()];
    dist[source] = Some(0);
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        let base = match dist[v] {
            Some(d) => d,
            None => continue,
        };
        for &w in &adjacency[v] {
            if dist[w].is_none() {
                dist[w] = Some(base + 1);
                queue.push_back(w);
            }
        }
    }
    dist
}

fn closeness_dense(ids: &[String], adjacency: &[Vec<usize>]) -> BTreeMap<String, f64> {
    let n = adjacency.len();
    ids.iter()
        .enumerate()
        .map(|(u, id)| {
            let dist = bfs_distances(adjacency, u);
            let mut reachable = 0usize;
            let mut total = 0usize;
            for d in dist.into_iter().flatten() {
                reachable += 1;
                total += d;
            }
            // `reachable` includes the source itself at distance zero.
            let closeness = if total > 0 && n > 1 {
                let r = (reachable - 1) as f64;
                (r / total as f64) * (r / (n - 1) as f64)
            } else {
                0.0
            };
            (id.clone(), closeness)
        })
        .collect()
}

/// Brandes' betweenness centrality over unweighted shortest paths.
fn betweenness_dense(ids: &[String], adjacency: &[Vec<usize>]) -> BTreeMap<String, f64> {
    let n = adjacency.len();
    let mut centrality = vec![0.0f64; n];

    for s in 0..n {
        let mut stack: Vec<usize> = Vec::new();
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        sigma[s] = 1.0;
        let mut dist: Vec<i64> = vec![-1; n];
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    // Each undirected pair is accumulated from both endpoints; the
    // normalization folds the doubling in.
    if n > 2 {
        let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
        for value in &mut centrality {
            *value *= scale;
        }
    } else {
        for value in &mut centrality {
            *value = 0.0;
        }
    }

    ids.iter()
        .zip(centrality)
        .map(|(id, value)| (id.clone(), value))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
