/// Results aggregation across runs and comparison across graphs or
/// configurations.
///
/// [`aggregate`] reduces a batch of stochastic runs to per-status peak and
/// final statistics, normalized by node count and averaged over runs.
/// [`comparison_table`] assembles such statistics — or any keyed scalar
/// summaries — into a tabular result whose column set is the union of keys
/// across entries; a missing key yields a missing-value marker, never a
/// failure.
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::metrics::GraphProperties;
use crate::simulate::SimulationRun;

// ---------------------------------------------------------------------------
// AggregateStatistics
// ---------------------------------------------------------------------------

/// Per-status aggregate statistics over a run batch.
///
/// Exactly `2 × |statuses|` entries: `<status>_peak` and `<status>_final`,
/// each the run-average of the normalized per-run value. All values lie in
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatistics {
    entries: BTreeMap<String, f64>,
}

impl AggregateStatistics {
    /// Looks up one statistic by key (`"Infected_peak"`, `"Removed_final"`,
    /// ...).
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).copied()
    }

    /// All entries, ordered by key.
    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// AggregateError
// ---------------------------------------------------------------------------

/// Aggregation over a degenerate batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The run batch was empty; averages would be undefined.
    NoRuns,
    /// The total node count was zero; normalization would divide by zero.
    EmptyGraph,
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateError::NoRuns => f.write_str("cannot aggregate zero simulation runs"),
            AggregateError::EmptyGraph => {
                f.write_str("cannot normalize statistics over a zero-node graph")
            }
        }
    }
}

impl std::error::Error for AggregateError {}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Averages per-run peak and final values per status, normalized by
/// `node_count`.
///
/// Runs of unequal length are expected — truncated runs are valid inputs;
/// each run contributes its own final and peak values.
///
/// # Errors
///
/// [`AggregateError::NoRuns`] for an empty batch and
/// [`AggregateError::EmptyGraph`] for a zero node count; degenerate inputs
/// never produce NaN-filled statistics.
pub fn aggregate(
    runs: &[SimulationRun],
    statuses: &[String],
    node_count: usize,
) -> Result<AggregateStatistics, AggregateError> {
    if runs.is_empty() {
        return Err(AggregateError::NoRuns);
    }
    if node_count == 0 {
        return Err(AggregateError::EmptyGraph);
    }

    let scale = 1.0 / node_count as f64;
    let run_scale = 1.0 / runs.len() as f64;
    let mut entries = BTreeMap::new();

    for (status_idx, status) in statuses.iter().enumerate() {
        let mut peak_sum = 0.0;
        let mut final_sum = 0.0;
        for run in runs {
            peak_sum += run.peak_count(status_idx).unwrap_or(0) as f64 * scale;
            final_sum += run.final_count(status_idx).unwrap_or(0) as f64 * scale;
        }
        entries.insert(format!("{status}_peak"), peak_sum * run_scale);
        entries.insert(format!("{status}_final"), final_sum * run_scale);
    }

    Ok(AggregateStatistics { entries })
}

// ---------------------------------------------------------------------------
// ComparisonTable
// ---------------------------------------------------------------------------

/// A tabular comparison of keyed scalar summaries.
///
/// One row per entry, keyed by the supplied index; the column set is the
/// sorted union of keys across all entries, and a cell is `None` when its
/// entry lacks that key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    index: Vec<String>,
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl ComparisonTable {
    /// Row labels, in row order.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Column labels, sorted.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up one cell; `None` either when the row or column is absent or
    /// when the entry lacked the key.
    pub fn get(&self, row_label: &str, column: &str) -> Option<f64> {
        let row = self.index.iter().position(|label| label == row_label)?;
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows[row][col]
    }
}

/// Assembles keyed scalar summaries into a [`ComparisonTable`].
///
/// `indices` selects and keys the entries to include (mirroring positional
/// selection on the entry list); `None` includes every entry keyed by
/// position. Out-of-range indices are skipped with a warning.
pub fn comparison_table(
    entries: &[BTreeMap<String, f64>],
    indices: Option<&[usize]>,
) -> ComparisonTable {
    let selected: Vec<usize> = match indices {
        Some(indices) => indices
            .iter()
            .copied()
            .filter(|&i| {
                let in_range = i < entries.len();
                if !in_range {
                    tracing::warn!(index = i, entries = entries.len(), "comparison index out of range, skipped");
                }
                in_range
            })
            .collect(),
        None => (0..entries.len()).collect(),
    };

    let columns: Vec<String> = selected
        .iter()
        .flat_map(|&i| entries[i].keys().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();

    let rows = selected
        .iter()
        .map(|&i| {
            columns
                .iter()
                .map(|column| entries[i].get(column).copied())
                .collect()
        })
        .collect();

    ComparisonTable {
        index: selected.iter().map(usize::to_string).collect(),
        columns,
        rows,
    }
}

/// Tabulates aggregate statistics across graphs or configurations.
pub fn average_stat_comparison(
    statistics: &[AggregateStatistics],
    indices: Option<&[usize]>,
) -> ComparisonTable {
    let entries: Vec<BTreeMap<String, f64>> =
        statistics.iter().map(|s| s.entries().clone()).collect();
    comparison_table(&entries, indices)
}

/// Tabulates scalar graph-property summaries across graphs.
pub fn graph_property_comparison(
    properties: &[GraphProperties],
    indices: Option<&[usize]>,
) -> ComparisonTable {
    let entries: Vec<BTreeMap<String, f64>> =
        properties.iter().map(GraphProperties::scalar_summary).collect();
    comparison_table(&entries, indices)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
