/// Match classification: turning feature vectors into match/non-match labels.
///
/// A [`ClassifierSpec`] is resolved to a [`Classifier`] through
/// [`build_classifier`] at configuration-validation time. Classifiers are
/// fitted once per batch ([`Classifier::fit`]) and then applied
/// ([`Classifier::predict`]); the decision function is probabilistic and can
/// misclassify — downstream community partitioning exists to absorb spurious
/// transitive links.
///
/// Shipped strategies:
///
/// - `"threshold"` — unsupervised. A pair matches when its features reach a
///   threshold (every feature, or the feature mean, per configuration).
/// - `"fellegi_sunter"` — supervised. Per-feature agreement/disagreement
///   log-likelihood weights are fitted from known-true training matches;
///   a pair matches when its summed weight is positive.
use std::collections::HashSet;

use crate::blocking::CandidatePair;
use crate::comparison::FeatureBatch;
use crate::config::{ClassifierSpec, ConfigurationError};

/// A feature value at or above this level counts as agreement on that
/// feature when estimating Fellegi–Sunter probabilities.
const AGREEMENT_LEVEL: f64 = 0.5;

// ---------------------------------------------------------------------------
// Classifier trait and registry
// ---------------------------------------------------------------------------

/// A match-decision strategy over feature vectors.
pub trait Classifier: std::fmt::Debug {
    /// Fits the decision function on a feature batch.
    ///
    /// `training` carries known-true matches for supervised strategies;
    /// unsupervised strategies ignore it.
    fn fit(
        &mut self,
        features: &FeatureBatch,
        training: Option<&[CandidatePair]>,
    ) -> Result<(), ConfigurationError>;

    /// Labels every pair in the batch; `true` means match.
    ///
    /// The output is aligned with [`FeatureBatch::pairs`], one label per
    /// scored pair.
    fn predict(&self, features: &FeatureBatch) -> Vec<bool>;
}

/// Resolves a classifier spec to a concrete [`Classifier`].
///
/// # Errors
///
/// - [`ConfigurationError::UnknownClassifier`] — unrecognized strategy.
/// - [`ConfigurationError::ParameterOutOfRange`] — a threshold outside
///   `[0, 1]`.
pub fn build_classifier(spec: &ClassifierSpec) -> Result<Box<dyn Classifier>, ConfigurationError> {
    match spec.strategy.as_str() {
        "threshold" => {
            let threshold = spec.threshold.unwrap_or(1.0);
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigurationError::ParameterOutOfRange {
                    parameter: "threshold".to_owned(),
                    value: threshold,
                });
            }
            Ok(Box::new(ThresholdClassifier {
                threshold,
                require_all: spec.require_all.unwrap_or(true),
            }))
        }
        "fellegi_sunter" => Ok(Box::new(FellegiSunterClassifier { weights: None })),
        other => Err(ConfigurationError::UnknownClassifier(other.to_owned())),
    }
}

/// Extracts the pairs labelled as matches, preserving batch order.
pub fn matched_pairs(features: &FeatureBatch, labels: &[bool]) -> Vec<CandidatePair> {
    features
        .pairs()
        .iter()
        .zip(labels)
        .filter(|&(_, &matched)| matched)
        .map(|(pair, _)| pair.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Threshold classifier
// ---------------------------------------------------------------------------

/// Unsupervised rule-based classifier.
///
/// With `require_all` every feature must reach the threshold; otherwise the
/// feature mean is compared. With the default threshold of 1.0 and
/// `require_all` this is the deterministic exact-agreement classifier.
#[derive(Debug)]
struct ThresholdClassifier {
    threshold: f64,
    require_all: bool,
}

impl Classifier for ThresholdClassifier {
    fn fit(
        &mut self,
        _features: &FeatureBatch,
        _training: Option<&[CandidatePair]>,
    ) -> Result<(), ConfigurationError> {
        Ok(())
    }

    fn predict(&self, features: &FeatureBatch) -> Vec<bool> {
        features
            .rows()
            .iter()
            .map(|row| {
                if row.is_empty() {
                    return false;
                }
                if self.require_all {
                    row.iter().all(|&v| v >= self.threshold)
                } else {
                    row.iter().sum::<f64>() / row.len() as f64 >= self.threshold
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Fellegi–Sunter classifier
// ---------------------------------------------------------------------------

/// Supervised probabilistic record-linkage classifier.
///
/// For each feature the fit estimates `m` (probability of agreement among
/// matches, from the training pairs) and `u` (probability of agreement among
/// the remaining pairs), Laplace-smoothed so degenerate batches never produce
/// infinite weights. A pair's score is the sum of `ln(m/u)` over agreeing
/// features and `ln((1-m)/(1-u))` over disagreeing ones; positive total
/// means match.
///
/// Training pairs are matched against candidate pairs orientation-free, so
/// `(a, b)` in the training set covers the candidate `(b, a)`.
#[derive(Debug)]
struct FellegiSunterClassifier {
    /// Per-feature `(agreement_weight, disagreement_weight)`; `None` until
    /// fitted. Predicting unfitted labels nothing a match.
    weights: Option<Vec<(f64, f64)>>,
}

fn unordered_key(pair: &CandidatePair) -> (String, String) {
    if pair.left <= pair.right {
        (pair.left.clone(), pair.right.clone())
    } else {
        (pair.right.clone(), pair.left.clone())
    }
}

impl Classifier for FellegiSunterClassifier {
    fn fit(
        &mut self,
        features: &FeatureBatch,
        training: Option<&[CandidatePair]>,
    ) -> Result<(), ConfigurationError> {
        let training = training.ok_or_else(|| {
            ConfigurationError::TrainingDataRequired("fellegi_sunter".to_owned())
        })?;
        let training_keys: HashSet<(String, String)> =
            training.iter().map(unordered_key).collect();

        let feature_count = features.labels().len();
        let mut match_agree = vec![0usize; feature_count];
        let mut match_total = 0usize;
        let mut rest_agree = vec![0usize; feature_count];
        let mut rest_total = 0usize;

        for (pair, row) in features.pairs().iter().zip(features.rows()) {
            let is_training_match = training_keys.contains(&unordered_key(pair));
            if is_training_match {
                match_total += 1;
            } else {
                rest_total += 1;
            }
            for (k, &value) in row.iter().enumerate() {
                if value >= AGREEMENT_LEVEL {
                    if is_training_match {
                        match_agree[k] += 1;
                    } else {
                        rest_agree[k] += 1;
                    }
                }
            }
        }

        // Laplace smoothing keeps m and u strictly inside (0, 1).
        let weights = (0..feature_count)
            .map(|k| {
                let m = (match_agree[k] + 1) as f64 / (match_total + 2) as f64;
                let u = (rest_agree[k] + 1) as f64 / (rest_total + 2) as f64;
                ((m / u).ln(), ((1.0 - m) / (1.0 - u)).ln())
            })
            .collect();

        self.weights = Some(weights);
        Ok(())
    }

    fn predict(&self, features: &FeatureBatch) -> Vec<bool> {
        let Some(weights) = self.weights.as_ref() else {
            return vec![false; features.len()];
        };

        features
            .rows()
            .iter()
            .map(|row| {
                let score: f64 = row
                    .iter()
                    .zip(weights)
                    .map(|(&value, &(agree, disagree))| {
                        if value >= AGREEMENT_LEVEL { agree } else { disagree }
                    })
                    .sum();
                score > 0.0
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
