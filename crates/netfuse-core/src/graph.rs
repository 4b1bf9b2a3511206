/// Attributed undirected graphs backed by `petgraph`.
///
/// An [`AttributedGraph`] wraps a [`StableUnGraph`] whose node weights carry
/// the entity identifier plus an attribute map, and maintains a
/// `HashMap<String, NodeIndex>` for O(1) lookup of nodes by identifier.
///
/// # Identity convention
///
/// Node identifiers are **pre-normalized strings**: non-empty, with no
/// leading or trailing whitespace. [`AttributedGraph::build`] enforces this
/// convention so that [`compose`] can treat identifier equality across graphs
/// as entity coincidence — two graphs that both contain a node `"acme-ltd"`
/// are declaring the *same* entity, not two entities that happen to share a
/// label. Callers with differently-scoped identifier namespaces must prefix
/// or otherwise normalize identifiers before building.
///
/// # Simple-graph semantics
///
/// Graphs are simple: adding an edge between an already-connected pair merges
/// the edge attribute maps (later values win per key) instead of introducing
/// a parallel edge. Self-loops are permitted on input.
use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};

/// Attribute map attached to a node or an edge.
///
/// Keys are attribute names; values are arbitrary JSON scalars or structures.
/// Attribute keys compared during matching must be consistent in name across
/// the records being compared.
pub type AttrMap = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// A node to be inserted into an [`AttributedGraph`]: an entity identifier
/// plus its attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Entity identifier, unique within one graph.
    pub id: String,
    /// Attribute-name → value mapping.
    #[serde(default)]
    pub attrs: AttrMap,
}

impl NodeRecord {
    /// Creates a record with an empty attribute map.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: AttrMap::new(),
        }
    }

    /// Adds one attribute, consuming and returning the record.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// An edge to be inserted into an [`AttributedGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Identifier of one endpoint.
    pub source: String,
    /// Identifier of the other endpoint.
    pub target: String,
    /// Optional edge attributes.
    #[serde(default)]
    pub attrs: AttrMap,
}

impl EdgeSpec {
    /// Creates an unattributed edge between two identifiers.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            attrs: AttrMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while constructing or composing attributed graphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphBuildError {
    /// Two nodes in one input share the same identifier.
    DuplicateNodeId(String),
    /// An edge references an identifier that is not present in the node set.
    DanglingEdgeRef {
        /// The endpoint identifier that could not be resolved.
        missing_node_id: String,
    },
    /// A node identifier violates the identity convention (empty, or carries
    /// surrounding whitespace).
    InvalidNodeId(String),
    /// [`compose`] was called with an empty graph list.
    NoInputGraphs,
}

impl std::fmt::Display for GraphBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphBuildError::DuplicateNodeId(id) => {
                write!(f, "duplicate node identifier: {id:?}")
            }
            GraphBuildError::DanglingEdgeRef { missing_node_id } => {
                write!(f, "edge references unknown node {missing_node_id:?}")
            }
            GraphBuildError::InvalidNodeId(id) => {
                write!(
                    f,
                    "node identifier {id:?} violates the identity convention \
                     (must be non-empty with no surrounding whitespace)"
                )
            }
            GraphBuildError::NoInputGraphs => {
                f.write_str("compose requires at least one input graph")
            }
        }
    }
}

impl std::error::Error for GraphBuildError {}

// ---------------------------------------------------------------------------
// AttributedGraph
// ---------------------------------------------------------------------------

/// An undirected attributed graph with identifier-indexed nodes.
///
/// Construct with [`AttributedGraph::build`] or [`compose`]. Once built the
/// graph is treated as immutable by every downstream stage; fusion produces a
/// fresh graph rather than mutating its input.
#[derive(Debug, Clone)]
pub struct AttributedGraph {
    graph: StableUnGraph<NodeRecord, AttrMap>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl AttributedGraph {
    /// Constructs a graph from node records and edge specs.
    ///
    /// Runs two passes: a node pass that validates the identity convention
    /// and uniqueness, then an edge pass that resolves endpoints. Adding an
    /// edge between an already-connected pair merges the attribute maps.
    ///
    /// # Errors
    ///
    /// - [`GraphBuildError::InvalidNodeId`] — identifier is empty or carries
    ///   surrounding whitespace.
    /// - [`GraphBuildError::DuplicateNodeId`] — two nodes share an identifier.
    /// - [`GraphBuildError::DanglingEdgeRef`] — an edge endpoint does not
    ///   resolve to a node.
    pub fn build(nodes: Vec<NodeRecord>, edges: Vec<EdgeSpec>) -> Result<Self, GraphBuildError> {
        let mut graph: StableUnGraph<NodeRecord, AttrMap> =
            StableUnGraph::with_capacity(nodes.len(), edges.len());
        let mut id_to_index: HashMap<String, NodeIndex> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if node.id.is_empty() || node.id.trim() != node.id {
                return Err(GraphBuildError::InvalidNodeId(node.id));
            }
            if id_to_index.contains_key(&node.id) {
                return Err(GraphBuildError::DuplicateNodeId(node.id));
            }
            let id = node.id.clone();
            let idx = graph.add_node(node);
            id_to_index.insert(id, idx);
        }

        let mut built = Self { graph, id_to_index };
        for edge in edges {
            let source = built.resolve(&edge.source)?;
            let target = built.resolve(&edge.target)?;
            built.merge_edge(source, target, edge.attrs);
        }

        Ok(built)
    }

    /// Creates an empty graph.
    pub fn empty() -> Self {
        Self {
            graph: StableUnGraph::default(),
            id_to_index: HashMap::new(),
        }
    }

    fn resolve(&self, id: &str) -> Result<NodeIndex, GraphBuildError> {
        self.id_to_index
            .get(id)
            .copied()
            .ok_or_else(|| GraphBuildError::DanglingEdgeRef {
                missing_node_id: id.to_owned(),
            })
    }

    /// Inserts or updates the edge between two resolved endpoints, merging
    /// attribute maps with later values winning per key.
    pub(crate) fn merge_edge(&mut self, a: NodeIndex, b: NodeIndex, attrs: AttrMap) {
        if let Some(existing) = self.graph.find_edge(a, b) {
            if let Some(weight) = self.graph.edge_weight_mut(existing) {
                for (key, value) in attrs {
                    weight.insert(key, value);
                }
            }
        } else {
            self.graph.add_edge(a, b, attrs);
        }
    }

    /// Inserts a node, assuming the identifier has already been validated.
    pub(crate) fn insert_record(&mut self, record: NodeRecord) -> NodeIndex {
        let id = record.id.clone();
        let idx = self.graph.add_node(record);
        self.id_to_index.insert(id, idx);
        idx
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns `true` if a node with the given identifier exists.
    pub fn contains(&self, id: &str) -> bool {
        self.id_to_index.contains_key(id)
    }

    /// Looks up the [`NodeIndex`] for an identifier.
    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.id_to_index.get(id).copied()
    }

    /// Returns the full record for an identifier, or `None` if absent.
    pub fn record(&self, id: &str) -> Option<&NodeRecord> {
        self.node_index(id).and_then(|idx| self.graph.node_weight(idx))
    }

    /// Iterates node identifiers in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|w| w.id.as_str()))
    }

    /// Iterates node records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
    }

    /// Iterates edges as `(source_id, target_id, attrs)` triples.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &AttrMap)> {
        self.graph.edge_references().filter_map(|edge| {
            let source = self.graph.node_weight(edge.source())?;
            let target = self.graph.node_weight(edge.target())?;
            Some((source.id.as_str(), target.id.as_str(), edge.weight()))
        })
    }

    /// Returns the identifiers adjacent to `id`, or `None` if `id` is absent.
    pub fn neighbors(&self, id: &str) -> Option<Vec<&str>> {
        let idx = self.node_index(id)?;
        Some(
            self.graph
                .neighbors(idx)
                .filter_map(|n| self.graph.node_weight(n).map(|w| w.id.as_str()))
                .collect(),
        )
    }

    /// Returns `true` if an edge exists between the two identifiers.
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        match (self.node_index(a), self.node_index(b)) {
            (Some(ia), Some(ib)) => self.graph.find_edge(ia, ib).is_some(),
            (None, Some(_)) | (Some(_), None) | (None, None) => false,
        }
    }

    /// Returns a reference to the underlying [`StableUnGraph`] for traversal
    /// and metric algorithms.
    pub fn graph(&self) -> &StableUnGraph<NodeRecord, AttrMap> {
        &self.graph
    }

    /// Flattens the graph to dense ordinals: node identifiers in insertion
    /// order plus an ordinal adjacency list.
    ///
    /// Traversal-heavy consumers (the diffusion simulator, centrality
    /// metrics) operate on this snapshot instead of chasing stable indices.
    pub fn dense_adjacency(&self) -> (Vec<String>, Vec<Vec<usize>>) {
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        let ordinal_of: HashMap<NodeIndex, usize> = indices
            .iter()
            .enumerate()
            .map(|(ordinal, &idx)| (idx, ordinal))
            .collect();

        let mut ids = Vec::with_capacity(indices.len());
        let mut adjacency = Vec::with_capacity(indices.len());
        for &idx in &indices {
            let id = self
                .graph
                .node_weight(idx)
                .map(|w| w.id.clone())
                .unwrap_or_default();
            ids.push(id);
            adjacency.push(
                self.graph
                    .neighbors(idx)
                    .filter_map(|n| ordinal_of.get(&n).copied())
                    .collect(),
            );
        }
        (ids, adjacency)
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Unions an ordered list of graphs into one.
///
/// Nodes with identical identifiers across graphs coincide (see the identity
/// convention in the module docs); their attribute maps are merged with
/// later-graph values winning per key. Edge sets are unioned under the same
/// simple-graph rule.
///
/// # Errors
///
/// Returns [`GraphBuildError::NoInputGraphs`] when `graphs` is empty.
pub fn compose(graphs: &[AttributedGraph]) -> Result<AttributedGraph, GraphBuildError> {
    let (first, rest) = graphs.split_first().ok_or(GraphBuildError::NoInputGraphs)?;

    let mut combined = first.clone();
    for graph in rest {
        for record in graph.records() {
            match combined.node_index(&record.id) {
                Some(idx) => {
                    if let Some(weight) = combined.graph.node_weight_mut(idx) {
                        for (key, value) in &record.attrs {
                            weight.attrs.insert(key.clone(), value.clone());
                        }
                    }
                }
                None => {
                    combined.insert_record(record.clone());
                }
            }
        }
        for (source, target, attrs) in graph.edges() {
            let a = combined.resolve(source)?;
            let b = combined.resolve(target)?;
            combined.merge_edge(a, b, attrs.clone());
        }
    }

    Ok(combined)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
