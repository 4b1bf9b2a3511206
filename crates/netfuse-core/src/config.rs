/// Declarative fusion configuration and the shared error taxonomy.
///
/// A [`FusionConfig`] carries three keyed sections — blocking rules,
/// comparison rules, and the classifier — plus the community-detection
/// algorithm used to refine match-graph components. Every strategy is named
/// by string and resolved through a registry exactly once, at
/// configuration-validation time, before any expensive work starts; an
/// unknown name surfaces as a [`ConfigurationError`] with nothing partially
/// applied.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rule structures
// ---------------------------------------------------------------------------

/// One blocking rule: a strategy name plus its parameters.
///
/// Shipped strategies (see [`crate::blocking`]):
///
/// - `"full"` — full cross product, no parameters. Quadratic; only suitable
///   for small tables.
/// - `"exact"` — exact-key blocking on `attribute`.
/// - `"sorted_neighbourhood"` — window over the `attribute`-sorted record
///   sequence; `window` defaults to 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingRule {
    /// Strategy name, resolved through the blocking registry.
    pub strategy: String,
    /// Attribute key the strategy blocks on. Required by every strategy
    /// except `"full"`.
    #[serde(default)]
    pub attribute: Option<String>,
    /// Window width for `"sorted_neighbourhood"`.
    #[serde(default)]
    pub window: Option<usize>,
}

impl BlockingRule {
    /// Exact-key blocking on one attribute.
    pub fn exact(attribute: impl Into<String>) -> Self {
        Self {
            strategy: "exact".to_owned(),
            attribute: Some(attribute.into()),
            window: None,
        }
    }

    /// Full cross-product blocking.
    pub fn full() -> Self {
        Self {
            strategy: "full".to_owned(),
            attribute: None,
            window: None,
        }
    }

    /// Sorted-neighbourhood blocking with the given window width.
    pub fn sorted_neighbourhood(attribute: impl Into<String>, window: usize) -> Self {
        Self {
            strategy: "sorted_neighbourhood".to_owned(),
            attribute: Some(attribute.into()),
            window: Some(window),
        }
    }
}

/// One comparison rule: an attribute pair, a comparison kind, parameters,
/// and the output feature label.
///
/// Shipped kinds (see [`crate::comparison`]): `"exact"`, `"string"`
/// (normalized Levenshtein similarity, optionally binarized at `threshold`),
/// and `"numeric"` (linear falloff within `tolerance`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRule {
    /// Comparison kind, resolved through the comparison registry.
    pub kind: String,
    /// Attribute key on the left table.
    pub attribute: String,
    /// Attribute key on the right table; defaults to `attribute`.
    #[serde(default)]
    pub attribute_right: Option<String>,
    /// Similarity threshold for `"string"`: when set, the raw similarity is
    /// binarized to 0.0/1.0 at this value.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Absolute tolerance for `"numeric"`.
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Label under which the feature appears in the feature vector.
    pub label: String,
}

impl ComparisonRule {
    /// Exact comparison of one attribute, labelled after the attribute.
    pub fn exact(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        Self {
            kind: "exact".to_owned(),
            label: attribute.clone(),
            attribute,
            attribute_right: None,
            threshold: None,
            tolerance: None,
        }
    }

    /// String-similarity comparison binarized at `threshold`.
    pub fn string(attribute: impl Into<String>, threshold: f64) -> Self {
        let attribute = attribute.into();
        Self {
            kind: "string".to_owned(),
            label: attribute.clone(),
            attribute,
            attribute_right: None,
            threshold: Some(threshold),
            tolerance: None,
        }
    }

    /// Numeric comparison with linear falloff inside `tolerance`.
    pub fn numeric(attribute: impl Into<String>, tolerance: f64) -> Self {
        let attribute = attribute.into();
        Self {
            kind: "numeric".to_owned(),
            label: attribute.clone(),
            attribute,
            attribute_right: None,
            threshold: None,
            tolerance: Some(tolerance),
        }
    }
}

/// Classifier selection and parameters.
///
/// Shipped strategies (see [`crate::classify`]): `"threshold"` (unsupervised)
/// and `"fellegi_sunter"` (supervised; requires training matches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSpec {
    /// Strategy name, resolved through the classifier registry.
    pub strategy: String,
    /// Decision threshold for `"threshold"`. Defaults to 1.0 (all features
    /// must agree exactly).
    #[serde(default)]
    pub threshold: Option<f64>,
    /// When `true` (the default), `"threshold"` requires every feature to
    /// reach the threshold; when `false`, the feature mean is compared.
    #[serde(default)]
    pub require_all: Option<bool>,
}

impl ClassifierSpec {
    /// Deterministic classifier: match when every feature reaches `threshold`.
    pub fn threshold(threshold: f64) -> Self {
        Self {
            strategy: "threshold".to_owned(),
            threshold: Some(threshold),
            require_all: Some(true),
        }
    }

    /// Supervised Fellegi–Sunter classifier.
    pub fn fellegi_sunter() -> Self {
        Self {
            strategy: "fellegi_sunter".to_owned(),
            threshold: None,
            require_all: None,
        }
    }
}

/// Community-detection algorithm selection.
///
/// Shipped algorithms (see [`crate::communities`]): `"walktrap"` (default)
/// and `"connected_components"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySpec {
    /// Algorithm name, resolved through the community registry.
    pub algorithm: String,
    /// Random-walk length for `"walktrap"`. Defaults to 4.
    #[serde(default)]
    pub walk_length: Option<usize>,
}

impl Default for CommunitySpec {
    fn default() -> Self {
        Self {
            algorithm: "walktrap".to_owned(),
            walk_length: None,
        }
    }
}

impl CommunitySpec {
    /// The trivial detector: one cluster per connected component.
    pub fn connected_components() -> Self {
        Self {
            algorithm: "connected_components".to_owned(),
            walk_length: None,
        }
    }
}

/// One complete fusion configuration: how candidates are generated, compared,
/// classified, and how the resulting match graph is partitioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Blocking rules; the candidate set is the deduplicated union over all
    /// rules.
    pub blocking: Vec<BlockingRule>,
    /// Comparison rules; one feature per rule.
    pub comparison: Vec<ComparisonRule>,
    /// Classifier selection.
    pub classifier: ClassifierSpec,
    /// Community-detection algorithm for match-graph refinement.
    #[serde(default)]
    pub community: CommunitySpec,
}

// ---------------------------------------------------------------------------
// ConfigurationError
// ---------------------------------------------------------------------------

/// A configuration-shape error: unknown strategy name, malformed rule, or
/// malformed diffusion model definition.
///
/// Always detected before expensive work starts and never partially applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A blocking rule names a strategy absent from the registry.
    UnknownBlockingStrategy(String),
    /// A comparison rule names a kind absent from the registry.
    UnknownComparisonKind(String),
    /// The classifier spec names a strategy absent from the registry.
    UnknownClassifier(String),
    /// The community spec names an algorithm absent from the registry.
    UnknownCommunityAlgorithm(String),
    /// A rule is missing a parameter its strategy requires.
    MissingParameter {
        /// The strategy or kind the rule named.
        strategy: String,
        /// The absent parameter.
        parameter: &'static str,
    },
    /// A numeric parameter lies outside its permitted range.
    ParameterOutOfRange {
        /// The parameter name.
        parameter: String,
        /// The offending value.
        value: f64,
    },
    /// A supervised classifier was selected but no training matches were
    /// supplied.
    TrainingDataRequired(String),
    /// A diffusion model defines no statuses.
    EmptyStatusSet,
    /// A status appears more than once in the model's status list.
    DuplicateStatus(String),
    /// A transition rule or compartment references a status absent from the
    /// model's status set.
    UnknownStatus {
        /// Where the reference occurred (rule index or compartment name).
        context: String,
        /// The unresolved status.
        status: String,
    },
    /// A transition rule references a compartment that is not defined.
    UnknownCompartment {
        /// Index of the offending rule.
        rule_index: usize,
        /// The unresolved compartment name.
        compartment: String,
    },
    /// An initial-condition entry seeds the model's default status.
    SeedsDefaultStatus(String),
    /// Seed fractions sum to more than 1.0.
    SeedFractionSumExceedsOne(f64),
    /// An explicit seed set references a node absent from the target graph.
    UnknownSeedNode(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::UnknownBlockingStrategy(name) => {
                write!(f, "unknown blocking strategy: {name:?}")
            }
            ConfigurationError::UnknownComparisonKind(name) => {
                write!(f, "unknown comparison kind: {name:?}")
            }
            ConfigurationError::UnknownClassifier(name) => {
                write!(f, "unknown classifier strategy: {name:?}")
            }
            ConfigurationError::UnknownCommunityAlgorithm(name) => {
                write!(f, "unknown community-detection algorithm: {name:?}")
            }
            ConfigurationError::MissingParameter {
                strategy,
                parameter,
            } => {
                write!(f, "strategy {strategy:?} requires parameter {parameter:?}")
            }
            ConfigurationError::ParameterOutOfRange { parameter, value } => {
                write!(f, "parameter {parameter:?} out of range: {value}")
            }
            ConfigurationError::TrainingDataRequired(name) => {
                write!(
                    f,
                    "classifier {name:?} is supervised and requires training matches"
                )
            }
            ConfigurationError::EmptyStatusSet => {
                f.write_str("diffusion model defines no statuses")
            }
            ConfigurationError::DuplicateStatus(status) => {
                write!(f, "duplicate status in model definition: {status:?}")
            }
            ConfigurationError::UnknownStatus { context, status } => {
                write!(f, "{context} references unknown status {status:?}")
            }
            ConfigurationError::UnknownCompartment {
                rule_index,
                compartment,
            } => {
                write!(
                    f,
                    "transition rule {rule_index} references unknown compartment {compartment:?}"
                )
            }
            ConfigurationError::SeedsDefaultStatus(status) => {
                write!(
                    f,
                    "initial condition seeds the default status {status:?}; seed a non-default status instead"
                )
            }
            ConfigurationError::SeedFractionSumExceedsOne(total) => {
                write!(f, "seed fractions sum to {total}, exceeding 1.0")
            }
            ConfigurationError::UnknownSeedNode(id) => {
                write!(f, "explicit seed set references unknown node {id:?}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// A blocking or comparison rule references an attribute that no row of the
/// target record table carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// The attribute the rule referenced.
    pub attribute: String,
    /// The label of the table missing the attribute.
    pub table: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attribute {:?} is absent from table {:?}",
            self.attribute, self.table
        )
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn rule_constructors_fill_strategy_names() {
        assert_eq!(BlockingRule::exact("name").strategy, "exact");
        assert_eq!(BlockingRule::full().strategy, "full");
        let snm = BlockingRule::sorted_neighbourhood("name", 5);
        assert_eq!(snm.strategy, "sorted_neighbourhood");
        assert_eq!(snm.window, Some(5));

        assert_eq!(ComparisonRule::exact("name").kind, "exact");
        assert_eq!(ComparisonRule::string("name", 0.85).kind, "string");
        assert_eq!(ComparisonRule::numeric("age", 2.0).kind, "numeric");

        assert_eq!(ClassifierSpec::threshold(1.0).strategy, "threshold");
        assert_eq!(CommunitySpec::default().algorithm, "walktrap");
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = FusionConfig {
            blocking: vec![BlockingRule::exact("surname")],
            comparison: vec![
                ComparisonRule::exact("surname"),
                ComparisonRule::string("given_name", 0.85),
            ],
            classifier: ClassifierSpec::threshold(1.0),
            community: CommunitySpec::default(),
        };
        let text = serde_json::to_string(&config).expect("serializes");
        let back: FusionConfig = serde_json::from_str(&text).expect("deserializes");
        assert_eq!(back, config);
    }

    #[test]
    fn errors_render_the_offending_names() {
        let err = ConfigurationError::UnknownBlockingStrategy("soundex".to_owned());
        assert!(err.to_string().contains("soundex"));

        let err = SchemaError {
            attribute: "surname".to_owned(),
            table: "graph_1".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("surname"));
        assert!(msg.contains("graph_1"));
    }
}
