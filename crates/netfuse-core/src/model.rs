/// Declarative diffusion model definitions.
///
/// A [`DiffusionModelSpec`] is a state-machine description: an ordered set of
/// statuses, named compartments (the stochastic or deterministic conditions
/// governing transitions), an ordered list of transition rules, and
/// initial-condition parameters. The spec is pure data — it is validated
/// wholesale by [`DiffusionModelSpec::validate`] and translated into a
/// runtime model exactly once per simulation batch by
/// [`crate::simulate::compile`]; nothing ever mutates it.
///
/// The **first** status in the ordered list is the model's default status:
/// every node not claimed by an initial-condition seed starts there. The
/// conventional epidemic models name it `"Susceptible"`, but nothing is
/// hardcoded to that name.
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::ConfigurationError;

// ---------------------------------------------------------------------------
// Compartments
// ---------------------------------------------------------------------------

/// A named condition governing one status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompartmentSpec {
    /// Bernoulli trial with the given propensity, evaluated once per
    /// eligible node per step.
    ///
    /// With a `trigger_status` the trial only runs for nodes that have at
    /// least one neighbor in that status (contagion-style); without one the
    /// trial runs unconditionally (spontaneous transition).
    Stochastic {
        /// Success probability of the per-node Bernoulli trial, in `[0, 1]`.
        propensity: f64,
        /// Neighbor status gating the trial, if any.
        #[serde(default)]
        trigger_status: Option<String>,
    },
    /// Deterministic transition once the fraction of neighbors in
    /// `trigger_status` reaches `threshold`.
    Threshold {
        /// Neighbor fraction at which the transition fires, in `[0, 1]`.
        threshold: f64,
        /// Status counted among neighbors.
        trigger_status: String,
    },
}

/// One transition rule: nodes in `from` move to `to` when `compartment`
/// fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    /// Status a node must currently hold.
    pub from: String,
    /// Status the node moves to.
    pub to: String,
    /// Name of the compartment evaluated for the transition.
    pub compartment: String,
}

impl TransitionRule {
    /// Creates a rule.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        compartment: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            compartment: compartment.into(),
        }
    }
}

/// An initial-condition parameter: the fraction of nodes seeded into a
/// non-default status at step 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFraction {
    /// The seeded status.
    pub status: String,
    /// Fraction of nodes, in `[0, 1]`, sampled uniformly without
    /// replacement.
    pub fraction: f64,
}

// ---------------------------------------------------------------------------
// DiffusionModelSpec
// ---------------------------------------------------------------------------

/// A complete declarative diffusion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionModelSpec {
    /// Optional display name (`"SIR"`, `"Threshold"`, ...).
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered status set; the first entry is the default status.
    pub statuses: Vec<String>,
    /// Compartment definitions keyed by name. A `BTreeMap` keeps iteration
    /// and serialization order deterministic.
    pub compartments: BTreeMap<String, CompartmentSpec>,
    /// Ordered transition rules; within one step the first rule that fires
    /// for a node wins.
    pub rules: Vec<TransitionRule>,
    /// Initial-condition parameters.
    #[serde(default)]
    pub seeds: Vec<SeedFraction>,
}

impl DiffusionModelSpec {
    /// The susceptible–infected–removed epidemic model.
    ///
    /// `beta` is the per-step infection propensity for nodes with at least
    /// one infected neighbor, `gamma` the per-step removal propensity, and
    /// `fraction_infected` the seeded infected fraction.
    pub fn sir(beta: f64, gamma: f64, fraction_infected: f64) -> Self {
        Self {
            name: Some("SIR".to_owned()),
            statuses: vec![
                "Susceptible".to_owned(),
                "Infected".to_owned(),
                "Removed".to_owned(),
            ],
            compartments: BTreeMap::from([
                (
                    "c1".to_owned(),
                    CompartmentSpec::Stochastic {
                        propensity: beta,
                        trigger_status: Some("Infected".to_owned()),
                    },
                ),
                (
                    "c2".to_owned(),
                    CompartmentSpec::Stochastic {
                        propensity: gamma,
                        trigger_status: None,
                    },
                ),
            ]),
            rules: vec![
                TransitionRule::new("Susceptible", "Infected", "c1"),
                TransitionRule::new("Infected", "Removed", "c2"),
            ],
            seeds: vec![SeedFraction {
                status: "Infected".to_owned(),
                fraction: fraction_infected,
            }],
        }
    }

    /// The deterministic neighbor-fraction threshold adoption model.
    pub fn threshold(threshold: f64, fraction_infected: f64) -> Self {
        Self {
            name: Some("Threshold".to_owned()),
            statuses: vec!["Susceptible".to_owned(), "Infected".to_owned()],
            compartments: BTreeMap::from([(
                "c1".to_owned(),
                CompartmentSpec::Threshold {
                    threshold,
                    trigger_status: "Infected".to_owned(),
                },
            )]),
            rules: vec![TransitionRule::new("Susceptible", "Infected", "c1")],
            seeds: vec![SeedFraction {
                status: "Infected".to_owned(),
                fraction: fraction_infected,
            }],
        }
    }

    /// The model's default status: the first entry of the status list.
    pub fn default_status(&self) -> Option<&str> {
        self.statuses.first().map(String::as_str)
    }

    /// Validates the whole definition before any run executes.
    ///
    /// # Errors
    ///
    /// Every malformation surfaces as a [`ConfigurationError`]:
    ///
    /// - empty or duplicated status set;
    /// - a compartment propensity/threshold outside `[0, 1]`;
    /// - a compartment or rule referencing an unknown status;
    /// - a rule referencing an unknown compartment;
    /// - a seed for an unknown status or for the default status;
    /// - a seed fraction outside `[0, 1]`, or seed fractions summing past 1.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.statuses.is_empty() {
            return Err(ConfigurationError::EmptyStatusSet);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for status in &self.statuses {
            if !seen.insert(status) {
                return Err(ConfigurationError::DuplicateStatus(status.clone()));
            }
        }

        for (name, compartment) in &self.compartments {
            match compartment {
                CompartmentSpec::Stochastic {
                    propensity,
                    trigger_status,
                } => {
                    if !(0.0..=1.0).contains(propensity) {
                        return Err(ConfigurationError::ParameterOutOfRange {
                            parameter: format!("compartment {name:?} propensity"),
                            value: *propensity,
                        });
                    }
                    if let Some(trigger) = trigger_status {
                        self.check_status(format!("compartment {name:?}"), trigger)?;
                    }
                }
                CompartmentSpec::Threshold {
                    threshold,
                    trigger_status,
                } => {
                    if !(0.0..=1.0).contains(threshold) {
                        return Err(ConfigurationError::ParameterOutOfRange {
                            parameter: format!("compartment {name:?} threshold"),
                            value: *threshold,
                        });
                    }
                    self.check_status(format!("compartment {name:?}"), trigger_status)?;
                }
            }
        }

        for (index, rule) in self.rules.iter().enumerate() {
            self.check_status(format!("transition rule {index}"), &rule.from)?;
            self.check_status(format!("transition rule {index}"), &rule.to)?;
            if !self.compartments.contains_key(&rule.compartment) {
                return Err(ConfigurationError::UnknownCompartment {
                    rule_index: index,
                    compartment: rule.compartment.clone(),
                });
            }
        }

        let default = self.default_status().unwrap_or_default();
        let mut seed_total = 0.0;
        for seed in &self.seeds {
            self.check_status("initial condition".to_owned(), &seed.status)?;
            if seed.status == default {
                return Err(ConfigurationError::SeedsDefaultStatus(seed.status.clone()));
            }
            if !(0.0..=1.0).contains(&seed.fraction) {
                return Err(ConfigurationError::ParameterOutOfRange {
                    parameter: format!("seed fraction for {:?}", seed.status),
                    value: seed.fraction,
                });
            }
            seed_total += seed.fraction;
        }
        if seed_total > 1.0 {
            return Err(ConfigurationError::SeedFractionSumExceedsOne(seed_total));
        }

        Ok(())
    }

    fn check_status(&self, context: String, status: &str) -> Result<(), ConfigurationError> {
        if self.statuses.iter().any(|s| s == status) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownStatus {
                context,
                status: status.to_owned(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
