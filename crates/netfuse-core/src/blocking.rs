/// Candidate-pair generation (blocking/indexing).
///
/// Blocking restricts pairwise comparison to pairs that share some indexed
/// property, avoiding the full cross product. Each [`BlockingRule`] is
/// resolved to a [`Blocker`] through [`build_blockers`] at
/// configuration-validation time; [`collect_candidates`] then runs every
/// blocker and returns the deduplicated union of their pairs.
///
/// Both linkage shapes are supported: single-table (deduplication within one
/// graph — pairs are distinct rows of the same table) and two-table (linkage
/// across two graphs — pairs take one row from each side).
///
/// Records whose blocking attribute is missing are simply not indexed by that
/// rule; an attribute absent from the *whole* table is a [`SchemaError`].
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{BlockingRule, ConfigurationError, SchemaError};
use crate::records::RecordTable;

// ---------------------------------------------------------------------------
// CandidatePair
// ---------------------------------------------------------------------------

/// An ordered pair of node identifiers produced by blocking.
///
/// For single-table blocking `left` precedes `right` in table row order; for
/// two-table blocking `left` comes from the first table and `right` from the
/// second. No pair is evaluated twice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    /// First member identifier.
    pub left: String,
    /// Second member identifier.
    pub right: String,
}

impl CandidatePair {
    /// Creates a pair.
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Blocker trait and registry
// ---------------------------------------------------------------------------

/// A candidate-generation strategy.
///
/// `right` is `None` for single-table deduplication and `Some` for two-table
/// linkage. Implementations must return each pair at most once; cross-rule
/// deduplication happens in [`collect_candidates`].
pub trait Blocker: std::fmt::Debug {
    /// Produces candidate pairs for one or two record tables.
    fn candidates(
        &self,
        left: &RecordTable,
        right: Option<&RecordTable>,
    ) -> Result<Vec<CandidatePair>, SchemaError>;
}

/// Resolves blocking rules to concrete [`Blocker`]s.
///
/// # Errors
///
/// - [`ConfigurationError::UnknownBlockingStrategy`] — unrecognized name.
/// - [`ConfigurationError::MissingParameter`] — `"exact"` or
///   `"sorted_neighbourhood"` without an attribute.
/// - [`ConfigurationError::ParameterOutOfRange`] — a sorted-neighbourhood
///   window that is zero or even (the window must be odd so the neighbourhood
///   is symmetric).
pub fn build_blockers(rules: &[BlockingRule]) -> Result<Vec<Box<dyn Blocker>>, ConfigurationError> {
    let mut blockers: Vec<Box<dyn Blocker>> = Vec::with_capacity(rules.len());

    for rule in rules {
        match rule.strategy.as_str() {
            "full" => blockers.push(Box::new(FullBlock)),
            "exact" => {
                let attribute = require_attribute(rule)?;
                blockers.push(Box::new(ExactBlock { attribute }));
            }
            "sorted_neighbourhood" => {
                let attribute = require_attribute(rule)?;
                let window = rule.window.unwrap_or(3);
                if window == 0 || window % 2 == 0 {
                    return Err(ConfigurationError::ParameterOutOfRange {
                        parameter: "window".to_owned(),
                        value: window as f64,
                    });
                }
                blockers.push(Box::new(SortedNeighbourhood { attribute, window }));
            }
            other => {
                return Err(ConfigurationError::UnknownBlockingStrategy(
                    other.to_owned(),
                ));
            }
        }
    }

    Ok(blockers)
}

fn require_attribute(rule: &BlockingRule) -> Result<String, ConfigurationError> {
    rule.attribute
        .clone()
        .ok_or(ConfigurationError::MissingParameter {
            strategy: rule.strategy.clone(),
            parameter: "attribute",
        })
}

/// Runs every blocker and unions the results.
///
/// The output is deduplicated and sorted, so candidate generation is
/// deterministic regardless of rule order.
pub fn collect_candidates(
    blockers: &[Box<dyn Blocker>],
    left: &RecordTable,
    right: Option<&RecordTable>,
) -> Result<Vec<CandidatePair>, SchemaError> {
    let mut union: BTreeSet<CandidatePair> = BTreeSet::new();
    for blocker in blockers {
        union.extend(blocker.candidates(left, right)?);
    }
    Ok(union.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Renders a blocking-key value as a string.
///
/// JSON strings block on their contents; every other value blocks on its
/// canonical JSON rendering, so `1` and `"1"` land in different blocks.
fn key_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_column(table: &RecordTable, attribute: &str) -> Result<(), SchemaError> {
    if table.has_column(attribute) {
        Ok(())
    } else {
        Err(SchemaError {
            attribute: attribute.to_owned(),
            table: table.label().to_owned(),
        })
    }
}

fn pair_from_rows(
    left: &RecordTable,
    right: Option<&RecordTable>,
    i: usize,
    j: usize,
) -> Option<CandidatePair> {
    match right {
        Some(right_table) => Some(CandidatePair::new(left.id(i)?, right_table.id(j)?)),
        None => Some(CandidatePair::new(left.id(i)?, left.id(j)?)),
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// The full cross product. Quadratic; intended for small tables and tests.
#[derive(Debug)]
struct FullBlock;

impl Blocker for FullBlock {
    fn candidates(
        &self,
        left: &RecordTable,
        right: Option<&RecordTable>,
    ) -> Result<Vec<CandidatePair>, SchemaError> {
        let mut pairs = Vec::new();
        match right {
            Some(right_table) => {
                for i in 0..left.len() {
                    for j in 0..right_table.len() {
                        pairs.extend(pair_from_rows(left, right, i, j));
                    }
                }
            }
            None => {
                for i in 0..left.len() {
                    for j in (i + 1)..left.len() {
                        pairs.extend(pair_from_rows(left, None, i, j));
                    }
                }
            }
        }
        Ok(pairs)
    }
}

/// Exact-key blocking: pairs share an identical value of one attribute.
#[derive(Debug)]
struct ExactBlock {
    attribute: String,
}

impl ExactBlock {
    fn index(&self, table: &RecordTable) -> HashMap<String, Vec<usize>> {
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
        for row in 0..table.len() {
            if let Some(value) = table.value(row, &self.attribute) {
                buckets.entry(key_string(value)).or_default().push(row);
            }
        }
        buckets
    }
}

impl Blocker for ExactBlock {
    fn candidates(
        &self,
        left: &RecordTable,
        right: Option<&RecordTable>,
    ) -> Result<Vec<CandidatePair>, SchemaError> {
        check_column(left, &self.attribute)?;
        if let Some(right_table) = right {
            check_column(right_table, &self.attribute)?;
        }

        let left_index = self.index(left);
        let mut pairs = Vec::new();

        match right {
            Some(right_table) => {
                let right_index = self.index(right_table);
                for (key, left_rows) in &left_index {
                    let Some(right_rows) = right_index.get(key) else {
                        continue;
                    };
                    for &i in left_rows {
                        for &j in right_rows {
                            pairs.extend(pair_from_rows(left, right, i, j));
                        }
                    }
                }
            }
            None => {
                for rows in left_index.values() {
                    for a in 0..rows.len() {
                        for b in (a + 1)..rows.len() {
                            pairs.extend(pair_from_rows(left, None, rows[a], rows[b]));
                        }
                    }
                }
            }
        }

        Ok(pairs)
    }
}

/// Sorted-neighbourhood blocking.
///
/// Records are sorted by the blocking key; each record is paired with the
/// `(window - 1) / 2` records that follow it in sort order. For two-table
/// linkage both tables are merged into one sorted sequence and only
/// cross-table pairs inside the neighbourhood are kept.
#[derive(Debug)]
struct SortedNeighbourhood {
    attribute: String,
    window: usize,
}

impl Blocker for SortedNeighbourhood {
    fn candidates(
        &self,
        left: &RecordTable,
        right: Option<&RecordTable>,
    ) -> Result<Vec<CandidatePair>, SchemaError> {
        check_column(left, &self.attribute)?;
        if let Some(right_table) = right {
            check_column(right_table, &self.attribute)?;
        }

        // (key, side, row): side 0 = left, 1 = right. Sorting by (key, side,
        // row) makes the sequence deterministic for tied keys.
        let mut sequence: Vec<(String, u8, usize)> = Vec::new();
        for row in 0..left.len() {
            if let Some(value) = left.value(row, &self.attribute) {
                sequence.push((key_string(value), 0, row));
            }
        }
        if let Some(right_table) = right {
            for row in 0..right_table.len() {
                if let Some(value) = right_table.value(row, &self.attribute) {
                    sequence.push((key_string(value), 1, row));
                }
            }
        }
        sequence.sort();

        let reach = (self.window - 1) / 2;
        let mut pairs = Vec::new();

        for i in 0..sequence.len() {
            for j in (i + 1)..sequence.len().min(i + reach + 1) {
                let (_, side_a, row_a) = sequence[i];
                let (_, side_b, row_b) = sequence[j];
                match right {
                    Some(_) => {
                        // Keep only cross-table pairs, left row first.
                        match (side_a, side_b) {
                            (0, 1) => pairs.extend(pair_from_rows(left, right, row_a, row_b)),
                            (1, 0) => pairs.extend(pair_from_rows(left, right, row_b, row_a)),
                            (_, _) => {}
                        }
                    }
                    None => {
                        let (lo, hi) = if row_a < row_b {
                            (row_a, row_b)
                        } else {
                            (row_b, row_a)
                        };
                        pairs.extend(pair_from_rows(left, None, lo, hi));
                    }
                }
            }
        }

        Ok(pairs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::graph::{AttributedGraph, NodeRecord};

    fn table(label: &str, rows: &[(&str, &[(&str, &str)])]) -> RecordTable {
        let nodes = rows
            .iter()
            .map(|(id, attrs)| {
                let mut record = NodeRecord::new(*id);
                for (key, value) in *attrs {
                    record = record.with_attr(*key, *value);
                }
                record
            })
            .collect();
        let graph = AttributedGraph::build(nodes, vec![]).expect("builds");
        RecordTable::from_graph(label, &graph)
    }

    fn run(rules: &[BlockingRule], left: &RecordTable, right: Option<&RecordTable>) -> Vec<CandidatePair> {
        let blockers = build_blockers(rules).expect("rules resolve");
        collect_candidates(&blockers, left, right).expect("candidates")
    }

    #[test]
    fn unknown_strategy_is_a_configuration_error() {
        let err = build_blockers(&[BlockingRule {
            strategy: "soundex".to_owned(),
            attribute: Some("name".to_owned()),
            window: None,
        }])
        .expect_err("unknown strategy");
        assert_eq!(
            err,
            ConfigurationError::UnknownBlockingStrategy("soundex".to_owned())
        );
    }

    #[test]
    fn exact_without_attribute_is_rejected() {
        let err = build_blockers(&[BlockingRule {
            strategy: "exact".to_owned(),
            attribute: None,
            window: None,
        }])
        .expect_err("missing attribute");
        assert_eq!(
            err,
            ConfigurationError::MissingParameter {
                strategy: "exact".to_owned(),
                parameter: "attribute",
            }
        );
    }

    #[test]
    fn even_window_is_rejected() {
        let err = build_blockers(&[BlockingRule::sorted_neighbourhood("name", 4)])
            .expect_err("even window");
        assert_eq!(
            err,
            ConfigurationError::ParameterOutOfRange {
                parameter: "window".to_owned(),
                value: 4.0,
            }
        );
    }

    #[test]
    fn missing_attribute_is_a_schema_error() {
        let t = table("graph_0", &[("a", &[("name", "ann")])]);
        let blockers = build_blockers(&[BlockingRule::exact("surname")]).expect("resolves");
        let err = collect_candidates(&blockers, &t, None).expect_err("schema error");
        assert_eq!(err.attribute, "surname");
        assert_eq!(err.table, "graph_0");
    }

    #[test]
    fn full_block_yields_all_unordered_pairs() {
        let t = table(
            "graph_0",
            &[("a", &[]), ("b", &[]), ("c", &[])],
        );
        let pairs = run(&[BlockingRule::full()], &t, None);
        assert_eq!(
            pairs,
            vec![
                CandidatePair::new("a", "b"),
                CandidatePair::new("a", "c"),
                CandidatePair::new("b", "c"),
            ]
        );
    }

    #[test]
    fn exact_block_pairs_only_shared_keys() {
        let t = table(
            "graph_0",
            &[
                ("a", &[("surname", "nilsson")]),
                ("b", &[("surname", "nilsson")]),
                ("c", &[("surname", "berg")]),
                ("d", &[]),
            ],
        );
        let pairs = run(&[BlockingRule::exact("surname")], &t, None);
        assert_eq!(pairs, vec![CandidatePair::new("a", "b")]);
    }

    #[test]
    fn exact_block_links_across_two_tables() {
        let left = table(
            "graph_0",
            &[("a1", &[("surname", "nilsson")]), ("a2", &[("surname", "berg")])],
        );
        let right = table(
            "graph_1",
            &[("b1", &[("surname", "berg")]), ("b2", &[("surname", "holm")])],
        );
        let pairs = run(&[BlockingRule::exact("surname")], &left, Some(&right));
        assert_eq!(pairs, vec![CandidatePair::new("a2", "b1")]);
    }

    #[test]
    fn union_of_rules_is_deduplicated() {
        let t = table(
            "graph_0",
            &[
                ("a", &[("surname", "nilsson"), ("city", "lund")]),
                ("b", &[("surname", "nilsson"), ("city", "lund")]),
            ],
        );
        let pairs = run(
            &[BlockingRule::exact("surname"), BlockingRule::exact("city")],
            &t,
            None,
        );
        assert_eq!(pairs, vec![CandidatePair::new("a", "b")], "no pair twice");
    }

    #[test]
    fn sorted_neighbourhood_pairs_adjacent_keys() {
        let t = table(
            "graph_0",
            &[
                ("a", &[("surname", "nilsson")]),
                ("b", &[("surname", "nilsen")]),
                ("c", &[("surname", "aberg")]),
            ],
        );
        // Sort order: aberg(c), nilsen(b), nilsson(a); window 3 pairs each
        // record with one follower.
        let pairs = run(&[BlockingRule::sorted_neighbourhood("surname", 3)], &t, None);
        assert_eq!(
            pairs,
            vec![CandidatePair::new("a", "b"), CandidatePair::new("b", "c")]
        );
    }

    #[test]
    fn sorted_neighbourhood_cross_table_keeps_cross_pairs_only() {
        let left = table("graph_0", &[("a1", &[("surname", "nilsson")])]);
        let right = table("graph_1", &[("b1", &[("surname", "nilsson2")])]);
        let pairs = run(
            &[BlockingRule::sorted_neighbourhood("surname", 3)],
            &left,
            Some(&right),
        );
        assert_eq!(pairs, vec![CandidatePair::new("a1", "b1")]);
    }
}
