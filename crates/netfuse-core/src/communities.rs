/// Match-graph construction and community partitioning.
///
/// Pairs labelled as matches form an undirected *match graph* of
/// same-entity hypotheses. Resolving at connected-component granularity
/// first, then refining each component with community detection, lets the
/// system recover from spurious transitive links: when the classifier
/// matched A–B and B–C but A and C are genuinely distinct, a pure
/// union-find would merge all three, while community detection can keep
/// A and C apart.
///
/// Components are relabelled to a dense integer range before detection
/// (the detectors assume contiguous indices) and translated back to
/// identifiers afterwards.
use std::collections::{BTreeSet, HashMap};

use crate::blocking::CandidatePair;
use crate::config::{CommunitySpec, ConfigurationError};
use crate::union_find::UnionFind;

// ---------------------------------------------------------------------------
// EntityCluster
// ---------------------------------------------------------------------------

/// A set of node identifiers believed to denote one real-world entity.
///
/// The first member is the cluster's canonical representative; fusion
/// contracts the remaining members into it. Clusters produced by one
/// [`partition`] call are pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCluster {
    /// Member identifiers; `members[0]` is the representative.
    pub members: Vec<String>,
}

impl EntityCluster {
    /// The canonical member every other member is contracted into.
    ///
    /// Empty clusters never leave [`partition`]; `None` only occurs for
    /// hand-built values.
    pub fn representative(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Dense component view
// ---------------------------------------------------------------------------

/// One connected component of the match graph, relabelled to indices
/// `0..node_count`.
#[derive(Debug, Clone)]
pub struct DenseGraph {
    adjacency: Vec<Vec<usize>>,
    edge_count: usize,
}

impl DenseGraph {
    /// Builds a dense graph from deduplicated edges over `0..n`.
    pub fn new(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut adjacency = vec![Vec::new(); n];
        for &(a, b) in edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        Self {
            adjacency,
            edge_count: edges.len(),
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Degree of node `i`.
    pub fn degree(&self, i: usize) -> usize {
        self.adjacency[i].len()
    }

    /// Neighbors of node `i`.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.adjacency[i]
    }
}

// ---------------------------------------------------------------------------
// Detector trait and registry
// ---------------------------------------------------------------------------

/// A community-detection algorithm over one dense component.
///
/// Returns disjoint communities covering every node of the component.
pub trait CommunityDetector: std::fmt::Debug {
    /// Partitions the component into communities of dense indices.
    fn detect(&self, component: &DenseGraph) -> Vec<Vec<usize>>;
}

/// Resolves a community spec to a concrete [`CommunityDetector`].
///
/// # Errors
///
/// - [`ConfigurationError::UnknownCommunityAlgorithm`] — unrecognized name.
/// - [`ConfigurationError::ParameterOutOfRange`] — a walk length of zero.
pub fn build_detector(
    spec: &CommunitySpec,
) -> Result<Box<dyn CommunityDetector>, ConfigurationError> {
    match spec.algorithm.as_str() {
        "walktrap" => {
            let walk_length = spec.walk_length.unwrap_or(4);
            if walk_length == 0 {
                return Err(ConfigurationError::ParameterOutOfRange {
                    parameter: "walk_length".to_owned(),
                    value: 0.0,
                });
            }
            Ok(Box::new(Walktrap { walk_length }))
        }
        "connected_components" => Ok(Box::new(WholeComponent)),
        other => Err(ConfigurationError::UnknownCommunityAlgorithm(
            other.to_owned(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Builds the match graph from labelled matches and partitions it into
/// entity clusters.
///
/// Self-pairs and duplicate edges collapse. Nodes are ordered by first
/// appearance in the match list, which fixes cluster member order and hence
/// the canonical representative. A node absent from the match graph forms an
/// implicit singleton cluster — it is simply not returned and therefore not
/// fused.
pub fn partition(
    matches: &[CandidatePair],
    detector: &dyn CommunityDetector,
) -> Vec<EntityCluster> {
    // Match-graph node set in first-appearance order.
    let mut ids: Vec<&str> = Vec::new();
    let mut ordinal_of: HashMap<&str, usize> = HashMap::new();
    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();

    for pair in matches {
        if pair.left == pair.right {
            continue;
        }
        let a = *ordinal_of.entry(pair.left.as_str()).or_insert_with(|| {
            ids.push(pair.left.as_str());
            ids.len() - 1
        });
        let b = *ordinal_of.entry(pair.right.as_str()).or_insert_with(|| {
            ids.push(pair.right.as_str());
            ids.len() - 1
        });
        edges.insert((a.min(b), a.max(b)));
    }

    let mut uf = UnionFind::new(ids.len());
    for &(a, b) in &edges {
        uf.union(a, b);
    }

    let mut clusters = Vec::new();
    for component in uf.groups() {
        // Relabel the component to dense indices in member order.
        let dense_of: HashMap<usize, usize> = component
            .iter()
            .enumerate()
            .map(|(dense, &ordinal)| (ordinal, dense))
            .collect();
        let component_edges: Vec<(usize, usize)> = edges
            .iter()
            .filter_map(|&(a, b)| Some((*dense_of.get(&a)?, *dense_of.get(&b)?)))
            .collect();

        if component_edges.is_empty() {
            // A component with zero edges yields no clusters.
            continue;
        }

        let dense = DenseGraph::new(component.len(), &component_edges);
        for mut community in detector.detect(&dense) {
            community.sort_unstable();
            let members = community
                .into_iter()
                .map(|dense_idx| ids[component[dense_idx]].to_owned())
                .collect();
            clusters.push(EntityCluster { members });
        }
    }

    clusters
}

// ---------------------------------------------------------------------------
// Whole-component detector
// ---------------------------------------------------------------------------

/// The trivial detector: every connected component is one cluster.
///
/// Equivalent to resolving with union-find alone; useful as a baseline and
/// when the classifier is trusted not to produce spurious transitive links.
#[derive(Debug)]
struct WholeComponent;

impl CommunityDetector for WholeComponent {
    fn detect(&self, component: &DenseGraph) -> Vec<Vec<usize>> {
        vec![(0..component.node_count()).collect()]
    }
}

// ---------------------------------------------------------------------------
// Walktrap detector
// ---------------------------------------------------------------------------

/// Random-walk-based hierarchical community detection (Pons–Latapy).
///
/// Short random walks tend to stay inside densely connected groups, so the
/// t-step walk distributions of nodes in one community are similar. Starting
/// from singleton communities, the algorithm repeatedly merges the adjacent
/// pair whose merge least increases the mean squared walk distance (Ward's
/// criterion), and returns the partition along that merge sequence with the
/// highest modularity.
#[derive(Debug)]
struct Walktrap {
    walk_length: usize,
}

impl CommunityDetector for Walktrap {
    fn detect(&self, component: &DenseGraph) -> Vec<Vec<usize>> {
        let n = component.node_count();
        if n <= 2 {
            return vec![(0..n).collect()];
        }

        let profiles = walk_profiles(component, self.walk_length);

        // Community state, indexed by community id. Merging folds the higher
        // id into the lower, so ids stay stable.
        let mut size: Vec<usize> = vec![1; n];
        let mut profile: Vec<Vec<f64>> = profiles;
        let mut neighbors: Vec<BTreeSet<usize>> = (0..n)
            .map(|i| component.neighbors(i).iter().copied().collect())
            .collect();
        let mut alive: Vec<bool> = vec![true; n];
        let mut community_of: Vec<usize> = (0..n).collect();

        let mut best_partition = community_of.clone();
        let mut best_q = modularity(component, &community_of);

        for _ in 0..n - 1 {
            // Find the adjacent pair with minimal merge cost.
            let mut best_pair: Option<(usize, usize)> = None;
            let mut best_cost = f64::INFINITY;
            for a in 0..n {
                if !alive[a] {
                    continue;
                }
                for &b in neighbors[a].range((a + 1)..) {
                    let cost = merge_cost(
                        component,
                        size[a],
                        &profile[a],
                        size[b],
                        &profile[b],
                    );
                    if cost < best_cost {
                        best_cost = cost;
                        best_pair = Some((a, b));
                    }
                }
            }

            let Some((a, b)) = best_pair else {
                break;
            };

            // Fold b into a.
            let merged_size = size[a] + size[b];
            let merged_profile: Vec<f64> = profile[a]
                .iter()
                .zip(&profile[b])
                .map(|(&pa, &pb)| {
                    (size[a] as f64 * pa + size[b] as f64 * pb) / merged_size as f64
                })
                .collect();
            profile[a] = merged_profile;
            size[a] = merged_size;
            alive[b] = false;

            let b_neighbors: Vec<usize> = neighbors[b].iter().copied().collect();
            for x in b_neighbors {
                neighbors[x].remove(&b);
                if x != a {
                    neighbors[x].insert(a);
                    neighbors[a].insert(x);
                }
            }
            neighbors[a].remove(&a);
            neighbors[b].clear();

            for c in community_of.iter_mut() {
                if *c == b {
                    *c = a;
                }
            }

            let q = modularity(component, &community_of);
            if q > best_q {
                best_q = q;
                best_partition = community_of.clone();
            }
        }

        // Collect the best partition, communities ordered by smallest member.
        let mut members_by_community: HashMap<usize, Vec<usize>> = HashMap::new();
        for (node, &c) in best_partition.iter().enumerate() {
            members_by_community.entry(c).or_default().push(node);
        }
        let mut communities: Vec<Vec<usize>> = members_by_community.into_values().collect();
        communities.sort_by_key(|members| members.first().copied());
        communities
    }
}

/// Computes each node's t-step random-walk distribution.
///
/// Every node in a component with at least one edge has positive degree, so
/// the transition probabilities are well defined.
fn walk_profiles(g: &DenseGraph, t: usize) -> Vec<Vec<f64>> {
    let n = g.node_count();
    let mut profiles = Vec::with_capacity(n);

    for start in 0..n {
        let mut p = vec![0.0f64; n];
        p[start] = 1.0;
        for _ in 0..t {
            let mut next = vec![0.0f64; n];
            for k in 0..n {
                if p[k] == 0.0 {
                    continue;
                }
                let share = p[k] / g.degree(k) as f64;
                for &j in g.neighbors(k) {
                    next[j] += share;
                }
            }
            p = next;
        }
        profiles.push(p);
    }

    profiles
}

/// Ward merge cost between two communities: the increase in mean squared
/// degree-normalized walk distance caused by merging them.
fn merge_cost(
    g: &DenseGraph,
    size_a: usize,
    profile_a: &[f64],
    size_b: usize,
    profile_b: &[f64],
) -> f64 {
    let n = g.node_count() as f64;
    let distance_sq: f64 = profile_a
        .iter()
        .zip(profile_b)
        .enumerate()
        .map(|(k, (&pa, &pb))| (pa - pb).powi(2) / g.degree(k) as f64)
        .sum();
    let balance = (size_a * size_b) as f64 / (size_a + size_b) as f64;
    balance * distance_sq / n
}

/// Newman modularity of a partition given as a community-id-per-node array.
///
/// Community ids are dense node indices, so index-addressed accumulators
/// keep the summation order (and hence the float result) deterministic.
fn modularity(g: &DenseGraph, community_of: &[usize]) -> f64 {
    let m = g.edge_count() as f64;
    if m == 0.0 {
        return 0.0;
    }

    let n = g.node_count();
    let mut intra = vec![0.0f64; n];
    let mut degree_sum = vec![0.0f64; n];

    for node in 0..n {
        degree_sum[community_of[node]] += g.degree(node) as f64;
        for &neighbor in g.neighbors(node) {
            if neighbor > node && community_of[neighbor] == community_of[node] {
                intra[community_of[node]] += 1.0;
            }
        }
    }

    (0..n)
        .map(|community| {
            let d = degree_sum[community];
            if d == 0.0 {
                return 0.0;
            }
            intra[community] / m - (d / (2.0 * m)).powi(2)
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
