/// Feature comparison: one similarity score per comparison rule per
/// candidate pair.
///
/// Each [`ComparisonRule`] is resolved to a [`Comparator`] through
/// [`build_comparators`] at configuration-validation time;
/// [`compute_features`] then scores every candidate pair against every
/// comparator, producing a [`FeatureBatch`] whose label set and row length
/// are identical across all pairs.
///
/// A value missing on one *record* scores 0.0 (maximum dissimilarity); an
/// attribute missing from the *whole table* is a [`SchemaError`].
use std::sync::LazyLock;

use regex::Regex;

use crate::blocking::CandidatePair;
use crate::config::{ComparisonRule, ConfigurationError, SchemaError};
use crate::records::RecordTable;

// ---------------------------------------------------------------------------
// FeatureBatch
// ---------------------------------------------------------------------------

/// Similarity feature vectors for a batch of candidate pairs.
///
/// Invariant: every row has exactly one entry per label, in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    labels: Vec<String>,
    pairs: Vec<CandidatePair>,
    rows: Vec<Vec<f64>>,
}

impl FeatureBatch {
    /// The feature labels shared by every row, in rule order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The candidate pairs, aligned with [`FeatureBatch::rows`].
    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    /// All feature rows, aligned with [`FeatureBatch::pairs`].
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Returns the number of scored pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` when no pairs were scored.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the feature row for pair `i`.
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        self.rows.get(i).map(Vec::as_slice)
    }
}

// ---------------------------------------------------------------------------
// Comparator trait and registry
// ---------------------------------------------------------------------------

/// A single-attribute similarity measure.
pub trait Comparator: std::fmt::Debug {
    /// The label under which this comparator's score appears.
    fn label(&self) -> &str;

    /// The compared attribute keys, `(left table, right table)`.
    fn attributes(&self) -> (&str, &str);

    /// Scores two present values in `[0, 1]`.
    fn score(&self, a: &serde_json::Value, b: &serde_json::Value) -> f64;
}

/// Resolves comparison rules to concrete [`Comparator`]s.
///
/// # Errors
///
/// - [`ConfigurationError::UnknownComparisonKind`] — unrecognized kind.
/// - [`ConfigurationError::MissingParameter`] — `"numeric"` without a
///   tolerance.
/// - [`ConfigurationError::ParameterOutOfRange`] — a string threshold outside
///   `[0, 1]` or a non-positive numeric tolerance.
pub fn build_comparators(
    rules: &[ComparisonRule],
) -> Result<Vec<Box<dyn Comparator>>, ConfigurationError> {
    let mut comparators: Vec<Box<dyn Comparator>> = Vec::with_capacity(rules.len());

    for rule in rules {
        let attribute = rule.attribute.clone();
        let attribute_right = rule.attribute_right.clone().unwrap_or_else(|| attribute.clone());
        let label = rule.label.clone();

        match rule.kind.as_str() {
            "exact" => {
                comparators.push(Box::new(ExactComparator {
                    label,
                    attribute,
                    attribute_right,
                }));
            }
            "string" => {
                if let Some(threshold) = rule.threshold {
                    if !(0.0..=1.0).contains(&threshold) {
                        return Err(ConfigurationError::ParameterOutOfRange {
                            parameter: "threshold".to_owned(),
                            value: threshold,
                        });
                    }
                }
                comparators.push(Box::new(StringComparator {
                    label,
                    attribute,
                    attribute_right,
                    threshold: rule.threshold,
                }));
            }
            "numeric" => {
                let tolerance =
                    rule.tolerance
                        .ok_or(ConfigurationError::MissingParameter {
                            strategy: "numeric".to_owned(),
                            parameter: "tolerance",
                        })?;
                if tolerance <= 0.0 {
                    return Err(ConfigurationError::ParameterOutOfRange {
                        parameter: "tolerance".to_owned(),
                        value: tolerance,
                    });
                }
                comparators.push(Box::new(NumericComparator {
                    label,
                    attribute,
                    attribute_right,
                    tolerance,
                }));
            }
            other => {
                return Err(ConfigurationError::UnknownComparisonKind(other.to_owned()));
            }
        }
    }

    Ok(comparators)
}

/// Scores every candidate pair against every comparator.
///
/// `right` is `None` for single-table deduplication, in which case both sides
/// of each pair resolve against `left`.
///
/// # Errors
///
/// [`SchemaError`] when a comparator's attribute is absent from the table it
/// targets. Pairs referencing identifiers absent from the tables score 0.0
/// on every feature rather than failing; blocking produced them from the
/// same tables, so this arises only with externally supplied pairs.
pub fn compute_features(
    comparators: &[Box<dyn Comparator>],
    pairs: &[CandidatePair],
    left: &RecordTable,
    right: Option<&RecordTable>,
) -> Result<FeatureBatch, SchemaError> {
    let right_table = right.unwrap_or(left);

    for comparator in comparators {
        let (attr_left, attr_right) = comparator.attributes();
        if !left.has_column(attr_left) {
            return Err(SchemaError {
                attribute: attr_left.to_owned(),
                table: left.label().to_owned(),
            });
        }
        if !right_table.has_column(attr_right) {
            return Err(SchemaError {
                attribute: attr_right.to_owned(),
                table: right_table.label().to_owned(),
            });
        }
    }

    let labels: Vec<String> = comparators.iter().map(|c| c.label().to_owned()).collect();
    let mut rows = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let left_row = left.row_of(&pair.left);
        let right_row = right_table.row_of(&pair.right);
        let mut row = Vec::with_capacity(comparators.len());

        for comparator in comparators {
            let (attr_left, attr_right) = comparator.attributes();
            let a = left_row.and_then(|r| left.value(r, attr_left));
            let b = right_row.and_then(|r| right_table.value(r, attr_right));
            let score = match (a, b) {
                (Some(a), Some(b)) => comparator.score(a, b),
                (None, Some(_)) | (Some(_), None) | (None, None) => 0.0,
            };
            row.push(score);
        }

        rows.push(row);
    }

    Ok(FeatureBatch {
        labels,
        pairs: pairs.to_vec(),
        rows,
    })
}

// ---------------------------------------------------------------------------
// String normalization
// ---------------------------------------------------------------------------

// The pattern is a compile-time literal; Regex::new never returns Err for it.
// The fallback chain exists because the workspace bans expect() and unwrap().
static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-z0-9]+").unwrap_or_else(|_| {
        // Never reached: the pattern above is always valid.
        Regex::new("a^").unwrap_or_else(|_| {
            Regex::new(".").unwrap_or_else(|_| {
                Regex::new(".").unwrap_or_else(|_| unreachable!("regex engine broken"))
            })
        })
    })
});

/// Normalizes a string for similarity comparison: lowercase, runs of
/// non-alphanumeric characters collapsed to single spaces, surrounding
/// whitespace trimmed.
pub fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    NON_ALNUM_RE.replace_all(&lower, " ").trim().to_owned()
}

/// Renders a JSON value as comparison text: strings are normalized, every
/// other value uses its canonical JSON rendering.
fn comparison_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => normalize(s),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Levenshtein distance
// ---------------------------------------------------------------------------

/// Levenshtein edit distance over Unicode scalar values, two-row dynamic
/// programming.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized Levenshtein similarity: `1 - distance / max_len`, with two
/// empty strings scoring 1.0.
fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

// ---------------------------------------------------------------------------
// Comparators
// ---------------------------------------------------------------------------

/// Scores 1.0 on exact value equality, 0.0 otherwise.
#[derive(Debug)]
struct ExactComparator {
    label: String,
    attribute: String,
    attribute_right: String,
}

impl Comparator for ExactComparator {
    fn label(&self) -> &str {
        &self.label
    }

    fn attributes(&self) -> (&str, &str) {
        (&self.attribute, &self.attribute_right)
    }

    fn score(&self, a: &serde_json::Value, b: &serde_json::Value) -> f64 {
        if a == b { 1.0 } else { 0.0 }
    }
}

/// Normalized Levenshtein similarity over normalized text, optionally
/// binarized at a threshold.
#[derive(Debug)]
struct StringComparator {
    label: String,
    attribute: String,
    attribute_right: String,
    threshold: Option<f64>,
}

impl Comparator for StringComparator {
    fn label(&self) -> &str {
        &self.label
    }

    fn attributes(&self) -> (&str, &str) {
        (&self.attribute, &self.attribute_right)
    }

    fn score(&self, a: &serde_json::Value, b: &serde_json::Value) -> f64 {
        let similarity = levenshtein_similarity(&comparison_text(a), &comparison_text(b));
        match self.threshold {
            Some(threshold) => {
                if similarity >= threshold {
                    1.0
                } else {
                    0.0
                }
            }
            None => similarity,
        }
    }
}

/// Linear similarity falloff inside an absolute tolerance: values further
/// apart than `tolerance` score 0.0. Non-numeric values score 0.0.
#[derive(Debug)]
struct NumericComparator {
    label: String,
    attribute: String,
    attribute_right: String,
    tolerance: f64,
}

impl Comparator for NumericComparator {
    fn label(&self) -> &str {
        &self.label
    }

    fn attributes(&self) -> (&str, &str) {
        (&self.attribute, &self.attribute_right)
    }

    fn score(&self, a: &serde_json::Value, b: &serde_json::Value) -> f64 {
        match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (1.0 - (a - b).abs() / self.tolerance).max(0.0),
            (None, Some(_)) | (Some(_), None) | (None, None) => 0.0,
        }
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
    use serde_json::json;

    fn table(label: &str, nodes: Vec<NodeRecord>) -> RecordTable {
        let graph = AttributedGraph::build(nodes, vec![]).expect("builds");
        RecordTable::from_graph(label, &graph)
    }

    fn single_feature(rule: ComparisonRule, nodes: Vec<NodeRecord>, pair: CandidatePair) -> f64 {
        let comparators = build_comparators(std::slice::from_ref(&rule)).expect("resolves");
        let t = table("graph_0", nodes);
        let batch = compute_features(&comparators, &[pair], &t, None).expect("computes");
        batch.row(0).expect("one row")[0]
    }

    #[test]
    fn unknown_kind_is_a_configuration_error() {
        let mut rule = ComparisonRule::exact("name");
        rule.kind = "jaro".to_owned();
        let err = build_comparators(&[rule]).expect_err("unknown kind");
        assert_eq!(err, ConfigurationError::UnknownComparisonKind("jaro".to_owned()));
    }

    #[test]
    fn numeric_without_tolerance_is_rejected() {
        let mut rule = ComparisonRule::exact("age");
        rule.kind = "numeric".to_owned();
        let err = build_comparators(&[rule]).expect_err("missing tolerance");
        assert_eq!(
            err,
            ConfigurationError::MissingParameter {
                strategy: "numeric".to_owned(),
                parameter: "tolerance",
            }
        );
    }

    #[test]
    fn missing_attribute_is_a_schema_error() {
        let comparators =
            build_comparators(&[ComparisonRule::exact("surname")]).expect("resolves");
        let t = table("graph_0", vec![NodeRecord::new("a").with_attr("name", "Ann")]);
        let err = compute_features(&comparators, &[], &t, None).expect_err("schema error");
        assert_eq!(err.attribute, "surname");
        assert_eq!(err.table, "graph_0");
    }

    #[test]
    fn exact_comparator_scores_equality() {
        let nodes = vec![
            NodeRecord::new("a").with_attr("name", "Ann"),
            NodeRecord::new("b").with_attr("name", "Ann"),
            NodeRecord::new("c").with_attr("name", "Bob"),
        ];
        assert_eq!(
            single_feature(
                ComparisonRule::exact("name"),
                nodes.clone(),
                CandidatePair::new("a", "b")
            ),
            1.0
        );
        assert_eq!(
            single_feature(
                ComparisonRule::exact("name"),
                nodes,
                CandidatePair::new("a", "c")
            ),
            0.0
        );
    }

    #[test]
    fn missing_value_scores_zero() {
        let nodes = vec![
            NodeRecord::new("a").with_attr("name", "Ann"),
            NodeRecord::new("b").with_attr("city", "Lund"),
        ];
        assert_eq!(
            single_feature(
                ComparisonRule::exact("name"),
                nodes,
                CandidatePair::new("a", "b")
            ),
            0.0
        );
    }

    #[test]
    fn string_comparator_is_case_and_punctuation_insensitive() {
        let nodes = vec![
            NodeRecord::new("a").with_attr("name", "Ann-Marie Berg"),
            NodeRecord::new("b").with_attr("name", "ann marie berg"),
        ];
        assert_eq!(
            single_feature(
                ComparisonRule::string("name", 0.9),
                nodes,
                CandidatePair::new("a", "b")
            ),
            1.0
        );
    }

    #[test]
    fn string_comparator_binarizes_at_threshold() {
        let nodes = vec![
            NodeRecord::new("a").with_attr("name", "nilsson"),
            NodeRecord::new("b").with_attr("name", "nilsen"),
            NodeRecord::new("c").with_attr("name", "zzz"),
        ];
        // nilsson vs nilsen: distance 2 over length 7 ≈ 0.71.
        assert_eq!(
            single_feature(
                ComparisonRule::string("name", 0.7),
                nodes.clone(),
                CandidatePair::new("a", "b")
            ),
            1.0
        );
        assert_eq!(
            single_feature(
                ComparisonRule::string("name", 0.7),
                nodes,
                CandidatePair::new("a", "c")
            ),
            0.0
        );
    }

    #[test]
    fn raw_string_similarity_without_threshold() {
        let nodes = vec![
            NodeRecord::new("a").with_attr("name", "abcd"),
            NodeRecord::new("b").with_attr("name", "abcx"),
        ];
        let mut rule = ComparisonRule::string("name", 0.0);
        rule.threshold = None;
        let score = single_feature(rule, nodes, CandidatePair::new("a", "b"));
        assert!((score - 0.75).abs() < 1e-12, "one edit over length four");
    }

    #[test]
    fn numeric_comparator_falls_off_linearly() {
        let nodes = vec![
            NodeRecord::new("a").with_attr("age", 30),
            NodeRecord::new("b").with_attr("age", 31),
            NodeRecord::new("c").with_attr("age", 35),
        ];
        let rule = ComparisonRule::numeric("age", 2.0);
        let close = single_feature(rule.clone(), nodes.clone(), CandidatePair::new("a", "b"));
        assert!((close - 0.5).abs() < 1e-12);
        let far = single_feature(rule, nodes, CandidatePair::new("a", "c"));
        assert_eq!(far, 0.0);
    }

    #[test]
    fn batch_rows_align_with_labels_and_pairs() {
        let comparators = build_comparators(&[
            ComparisonRule::exact("name"),
            ComparisonRule::numeric("age", 5.0),
        ])
        .expect("resolves");
        let t = table(
            "graph_0",
            vec![
                NodeRecord::new("a").with_attr("name", "Ann").with_attr("age", 30),
                NodeRecord::new("b").with_attr("name", "Ann").with_attr("age", 32),
            ],
        );
        let pairs = vec![CandidatePair::new("a", "b")];
        let batch = compute_features(&comparators, &pairs, &t, None).expect("computes");

        assert_eq!(batch.labels(), &["name".to_owned(), "age".to_owned()]);
        assert_eq!(batch.len(), 1);
        let row = batch.row(0).expect("row");
        assert_eq!(row.len(), batch.labels().len());
        assert_eq!(row[0], 1.0);
        assert!((row[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn two_table_comparison_reads_each_side() {
        let comparators =
            build_comparators(&[ComparisonRule::exact("name")]).expect("resolves");
        let left = table("graph_0", vec![NodeRecord::new("a").with_attr("name", "Ann")]);
        let right = table("graph_1", vec![NodeRecord::new("b").with_attr("name", "Ann")]);
        let batch = compute_features(
            &comparators,
            &[CandidatePair::new("a", "b")],
            &left,
            Some(&right),
        )
        .expect("computes");
        assert_eq!(batch.row(0).expect("row")[0], 1.0);
    }

    #[test]
    fn normalize_collapses_punctuation_runs() {
        assert_eq!(normalize("  Ann--Marie  BERG "), "ann marie berg");
        assert_eq!(normalize(""), "");
    }
}
