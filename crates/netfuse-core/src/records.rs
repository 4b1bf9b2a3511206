/// Record tables extracted from attributed graphs.
///
/// Candidate generation and feature comparison operate on flat tables — one
/// row per node, column set equal to the union of attribute keys across all
/// nodes — rather than on the graph itself. A [`RecordTable`] is a read-only
/// snapshot; building one never mutates the source graph.
use std::collections::{HashMap, HashSet};

use crate::graph::{AttrMap, AttributedGraph};

/// A flat view of one graph's node attributes.
///
/// Row order follows node insertion order in the source graph, so candidate
/// generation over the same graph is deterministic. Rows are index-aligned:
/// `ids[i]` owns `rows[i]`.
#[derive(Debug, Clone)]
pub struct RecordTable {
    /// Label used in schema error messages (`"graph_0"`, `"graph_1"`, ...).
    label: String,
    ids: Vec<String>,
    id_to_row: HashMap<String, usize>,
    rows: Vec<AttrMap>,
    columns: HashSet<String>,
}

impl RecordTable {
    /// Extracts a table from a graph, one row per node.
    pub fn from_graph(label: impl Into<String>, graph: &AttributedGraph) -> Self {
        let mut ids = Vec::with_capacity(graph.node_count());
        let mut id_to_row = HashMap::with_capacity(graph.node_count());
        let mut rows = Vec::with_capacity(graph.node_count());
        let mut columns = HashSet::new();

        for record in graph.records() {
            id_to_row.insert(record.id.clone(), ids.len());
            ids.push(record.id.clone());
            for key in record.attrs.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
            rows.push(record.attrs.clone());
        }

        Self {
            label: label.into(),
            ids,
            id_to_row,
            rows,
            columns,
        }
    }

    /// Returns the table's label, used in error messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the identifier of row `i`.
    ///
    /// Out-of-range indices return `None` rather than panicking.
    pub fn id(&self, i: usize) -> Option<&str> {
        self.ids.get(i).map(String::as_str)
    }

    /// Returns the row index holding `id`, or `None` if absent.
    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.id_to_row.get(id).copied()
    }

    /// Returns the value of `attribute` on row `i`, or `None` when the row
    /// does not carry that attribute.
    pub fn value(&self, i: usize, attribute: &str) -> Option<&serde_json::Value> {
        self.rows.get(i).and_then(|row| row.get(attribute))
    }

    /// Returns `true` if any row in the table carries `attribute`.
    pub fn has_column(&self, attribute: &str) -> bool {
        self.columns.contains(attribute)
    }
}
