/// The stochastic diffusion simulator.
///
/// [`compile`] translates a validated [`DiffusionModelSpec`] into a
/// [`CompiledModel`] against one concrete graph — statuses and compartment
/// references resolved to indices, adjacency flattened to dense ordinals —
/// exactly once per simulation batch. [`CompiledModel::run_many`] then
/// executes N independent stochastic trials, each with its own RNG.
///
/// # Step semantics
///
/// Updates are synchronous: every transition in step `t` is evaluated
/// against the status assignment of step `t - 1`. Within a step, rules are
/// evaluated in definition order and the first rule that fires for a node
/// wins, which keeps each trial deterministic given its RNG stream.
///
/// # Termination
///
/// A run stops at the first step in which no node changes status (an
/// absorbing state) or when the configured step bound is reached. Reaching
/// the bound is not an error: the run is returned truncated and marked
/// [`Termination::StepLimit`], and downstream aggregation tolerates runs of
/// unequal length.
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ConfigurationError;
use crate::graph::AttributedGraph;
use crate::model::{CompartmentSpec, DiffusionModelSpec};

// ---------------------------------------------------------------------------
// SimulationConfig
// ---------------------------------------------------------------------------

/// Batch-level execution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Maximum number of steps per run before truncation.
    pub max_steps: usize,
    /// Base RNG seed. When set, run `i` uses `seed + i`, making the whole
    /// batch reproducible; when unset every run draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Explicit seed sets, status → node identifiers. When present they
    /// replace the spec's sampled seed fractions.
    #[serde(default)]
    pub seed_nodes: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            seed: None,
            seed_nodes: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SimulationRun
// ---------------------------------------------------------------------------

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A fixed point: no node changed status in the final step.
    AbsorbingState,
    /// The step bound was reached; the run is truncated but valid.
    StepLimit,
}

/// One stochastic trial: a per-status time series of node counts.
///
/// Invariant: at every step the counts sum to the graph's node count. Series
/// length is identical across statuses within one run but may differ across
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRun {
    /// `counts[status][step]` = number of nodes in `status` at `step`,
    /// status-indexed in spec order.
    pub counts: Vec<Vec<usize>>,
    /// How the run ended.
    pub termination: Termination,
}

impl SimulationRun {
    /// Number of recorded steps (including step 0).
    pub fn steps(&self) -> usize {
        self.counts.first().map_or(0, Vec::len)
    }

    /// The final count for a status index.
    pub fn final_count(&self, status: usize) -> Option<usize> {
        self.counts.get(status).and_then(|series| series.last()).copied()
    }

    /// The peak count for a status index.
    pub fn peak_count(&self, status: usize) -> Option<usize> {
        self.counts
            .get(status)
            .and_then(|series| series.iter().max())
            .copied()
    }
}

// ---------------------------------------------------------------------------
// CompiledModel
// ---------------------------------------------------------------------------

/// A rule with all names resolved to indices.
#[derive(Debug, Clone)]
struct CompiledRule {
    from: usize,
    to: usize,
    compartment: CompiledCompartment,
}

#[derive(Debug, Clone)]
enum CompiledCompartment {
    Stochastic {
        propensity: f64,
        trigger: Option<usize>,
    },
    Threshold {
        threshold: f64,
        trigger: usize,
    },
}

/// A diffusion model bound to one graph, ready to execute runs.
///
/// Holds the spec's statuses and rules in resolved form plus a dense
/// adjacency snapshot of the graph; the spec and the graph are never mutated.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    statuses: Vec<String>,
    rules: Vec<CompiledRule>,
    seed_fractions: Vec<(usize, f64)>,
    adjacency: Vec<Vec<usize>>,
    node_ids: Vec<String>,
}

/// Translates a model spec into a runnable model against `graph`.
///
/// Validates the spec first, so a malformed definition fails here — before
/// any run executes — with a [`ConfigurationError`].
pub fn compile(
    spec: &DiffusionModelSpec,
    graph: &AttributedGraph,
) -> Result<CompiledModel, ConfigurationError> {
    spec.validate()?;

    let status_index = |status: &str| -> usize {
        // Unresolvable names were ruled out by validate().
        spec.statuses.iter().position(|s| s == status).unwrap_or(0)
    };

    let rules = spec
        .rules
        .iter()
        .map(|rule| {
            let compartment = match spec.compartments.get(&rule.compartment) {
                Some(CompartmentSpec::Stochastic {
                    propensity,
                    trigger_status,
                }) => CompiledCompartment::Stochastic {
                    propensity: *propensity,
                    trigger: trigger_status.as_deref().map(status_index),
                },
                Some(CompartmentSpec::Threshold {
                    threshold,
                    trigger_status,
                }) => CompiledCompartment::Threshold {
                    threshold: *threshold,
                    trigger: status_index(trigger_status),
                },
                // Ruled out by validate().
                None => CompiledCompartment::Stochastic {
                    propensity: 0.0,
                    trigger: None,
                },
            };
            CompiledRule {
                from: status_index(&rule.from),
                to: status_index(&rule.to),
                compartment,
            }
        })
        .collect();

    let seed_fractions = spec
        .seeds
        .iter()
        .map(|seed| (status_index(&seed.status), seed.fraction))
        .collect();

    let (node_ids, adjacency) = graph.dense_adjacency();

    Ok(CompiledModel {
        statuses: spec.statuses.clone(),
        rules,
        seed_fractions,
        adjacency,
        node_ids,
    })
}

impl CompiledModel {
    /// The model's statuses, in spec order.
    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    /// Number of nodes the model was compiled against.
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Executes `run_count` independent stochastic trials.
    ///
    /// Trials share the compiled model read-only but are otherwise
    /// statistically independent; each gets its own RNG.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnknownStatus`] or
    /// [`ConfigurationError::UnknownSeedNode`] when `config.seed_nodes`
    /// references names absent from the model or the graph. Checked before
    /// the first run executes.
    pub fn run_many(
        &self,
        run_count: usize,
        config: &SimulationConfig,
    ) -> Result<Vec<SimulationRun>, ConfigurationError> {
        let explicit_seeds = self.resolve_seed_nodes(config)?;

        let mut runs = Vec::with_capacity(run_count);
        for run_index in 0..run_count {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(run_index as u64)),
                None => StdRng::from_entropy(),
            };
            let run = self.run_one(&mut rng, config.max_steps, explicit_seeds.as_deref());
            if run.termination == Termination::StepLimit {
                tracing::debug!(run_index, max_steps = config.max_steps, "run truncated at step bound");
            }
            runs.push(run);
        }
        Ok(runs)
    }

    /// Resolves explicit seed sets to `(status, ordinal)` assignments.
    fn resolve_seed_nodes(
        &self,
        config: &SimulationConfig,
    ) -> Result<Option<Vec<(usize, usize)>>, ConfigurationError> {
        let Some(seed_nodes) = config.seed_nodes.as_ref() else {
            return Ok(None);
        };

        let mut assignments = Vec::new();
        for (status, ids) in seed_nodes {
            let status_idx = self
                .statuses
                .iter()
                .position(|s| s == status)
                .ok_or_else(|| ConfigurationError::UnknownStatus {
                    context: "explicit seed set".to_owned(),
                    status: status.clone(),
                })?;
            for id in ids {
                let ordinal = self
                    .node_ids
                    .iter()
                    .position(|n| n == id)
                    .ok_or_else(|| ConfigurationError::UnknownSeedNode(id.clone()))?;
                assignments.push((status_idx, ordinal));
            }
        }
        Ok(Some(assignments))
    }

    /// Executes one trial.
    fn run_one(
        &self,
        rng: &mut StdRng,
        max_steps: usize,
        explicit_seeds: Option<&[(usize, usize)]>,
    ) -> SimulationRun {
        let n = self.node_ids.len();
        let mut statuses: Vec<usize> = vec![0; n];

        match explicit_seeds {
            Some(assignments) => {
                for &(status, ordinal) in assignments {
                    statuses[ordinal] = status;
                }
            }
            None => {
                // Sample floor(fraction * n) nodes per seeded status,
                // uniformly without replacement across all seeds.
                let mut pool: Vec<usize> = (0..n).collect();
                for &(status, fraction) in &self.seed_fractions {
                    let count = ((fraction * n as f64).floor() as usize).min(pool.len());
                    for _ in 0..count {
                        let picked = rng.gen_range(0..pool.len());
                        let node = pool.swap_remove(picked);
                        statuses[node] = status;
                    }
                }
            }
        }

        let mut counts: Vec<Vec<usize>> = vec![Vec::new(); self.statuses.len()];
        record_counts(&mut counts, &statuses, self.statuses.len());

        let mut termination = Termination::StepLimit;
        for _ in 0..max_steps {
            let mut next = statuses.clone();
            let mut changed = false;

            for node in 0..n {
                let current = statuses[node];
                for rule in &self.rules {
                    if rule.from != current {
                        continue;
                    }
                    if self.fires(&rule.compartment, node, &statuses, rng) {
                        next[node] = rule.to;
                        changed = true;
                        break;
                    }
                }
            }

            if !changed {
                termination = Termination::AbsorbingState;
                break;
            }

            statuses = next;
            record_counts(&mut counts, &statuses, self.statuses.len());
        }

        SimulationRun {
            counts,
            termination,
        }
    }

    /// Evaluates one compartment for one node against the previous step's
    /// status assignment.
    fn fires(
        &self,
        compartment: &CompiledCompartment,
        node: usize,
        statuses: &[usize],
        rng: &mut StdRng,
    ) -> bool {
        match compartment {
            CompiledCompartment::Stochastic {
                propensity,
                trigger,
            } => {
                if let Some(trigger) = trigger {
                    let triggered = self.adjacency[node]
                        .iter()
                        .any(|&neighbor| statuses[neighbor] == *trigger);
                    if !triggered {
                        return false;
                    }
                }
                rng.r#gen::<f64>() < *propensity
            }
            CompiledCompartment::Threshold { threshold, trigger } => {
                let neighbors = &self.adjacency[node];
                if neighbors.is_empty() {
                    return false;
                }
                let in_trigger = neighbors
                    .iter()
                    .filter(|&&neighbor| statuses[neighbor] == *trigger)
                    .count();
                in_trigger as f64 / neighbors.len() as f64 >= *threshold
            }
        }
    }
}

fn record_counts(counts: &mut [Vec<usize>], statuses: &[usize], status_count: usize) {
    let mut tally = vec![0usize; status_count];
    for &status in statuses {
        tally[status] += 1;
    }
    for (series, count) in counts.iter_mut().zip(tally) {
        series.push(count);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
