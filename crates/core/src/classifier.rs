//! Frozen binary classifiers over TF-IDF rows.

use crate::error::{ArtifactError, PredictError};
use crate::models::{FeatureVector, FAKE_CLASS, REAL_CLASS};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub coef: Vec<f64>,
    pub intercept: f64,
    /// `[negative, positive]` class values.
    #[serde(default = "default_binary_classes")]
    pub classes: [i64; 2],
}

fn default_binary_classes() -> [i64; 2] {
    [FAKE_CLASS, REAL_CLASS]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    pub classes: Vec<i64>,
    pub class_log_prior: Vec<f64>,
    /// One row of per-feature log probabilities per class.
    pub feature_log_prob: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingEnsemble {
    pub estimators: Vec<Classifier>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    Linear(LinearModel),
    MultinomialNb(NaiveBayesModel),
    Voting(VotingEnsemble),
}

impl Classifier {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| ArtifactError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ArtifactError> {
        serde_json::from_str(raw).map_err(|e| ArtifactError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::Linear(_) => "linear",
            Classifier::MultinomialNb(_) => "multinomial_nb",
            Classifier::Voting(_) => "voting",
        }
    }

    /// Number of input features, or `None` for an empty ensemble.
    pub fn input_dim(&self) -> Option<usize> {
        match self {
            Classifier::Linear(m) => Some(m.coef.len()),
            Classifier::MultinomialNb(m) => m.feature_log_prob.first().map(Vec::len),
            Classifier::Voting(v) => v.estimators.first().and_then(Classifier::input_dim),
        }
    }

    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        match self {
            Classifier::Linear(m) => {
                if m.coef.iter().chain(std::iter::once(&m.intercept)).any(|w| !w.is_finite()) {
                    return Err(incompatible("linear model has non-finite parameters"));
                }
            }
            Classifier::MultinomialNb(m) => {
                let k = m.classes.len();
                if k < 2 {
                    return Err(incompatible("naive Bayes model needs at least two classes"));
                }
                if m.class_log_prior.len() != k || m.feature_log_prob.len() != k {
                    return Err(incompatible(
                        "naive Bayes priors and feature rows must match the class count",
                    ));
                }
                let dim = m.feature_log_prob[0].len();
                if m.feature_log_prob.iter().any(|row| row.len() != dim) {
                    return Err(incompatible("naive Bayes feature rows differ in length"));
                }
                let finite = m
                    .class_log_prior
                    .iter()
                    .chain(m.feature_log_prob.iter().flatten())
                    .all(|w| w.is_finite());
                if !finite {
                    return Err(incompatible("naive Bayes model has non-finite parameters"));
                }
            }
            Classifier::Voting(v) => {
                if v.estimators.is_empty() {
                    return Err(incompatible("voting ensemble has no estimators"));
                }
                if let Some(weights) = &v.weights {
                    if weights.len() != v.estimators.len() {
                        return Err(incompatible("voting weights do not match estimator count"));
                    }
                    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err(incompatible("voting weights must be finite and non-negative"));
                    }
                    if weights.iter().sum::<f64>() <= 0.0 {
                        return Err(incompatible("voting weights sum to zero"));
                    }
                }
                let dim = self.input_dim();
                for est in &v.estimators {
                    est.validate()?;
                    if est.input_dim() != dim {
                        return Err(incompatible("ensemble members disagree on input dimension"));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn predict(&self, x: &FeatureVector) -> Result<i64, PredictError> {
        self.predict_scored(x).map(|(class, _)| class)
    }

    /// Raw class plus a model-specific score: the decision value for linear
    /// models, the log-odds of the winner over the runner-up for naive Bayes
    /// and the winning vote share for ensembles.
    pub fn predict_scored(&self, x: &FeatureVector) -> Result<(i64, Option<f64>), PredictError> {
        if let Some(expected) = self.input_dim() {
            if expected != x.dim {
                return Err(PredictError::DimensionMismatch {
                    expected,
                    actual: x.dim,
                });
            }
        }
        match self {
            Classifier::Linear(m) => {
                let score = x.dot(&m.coef) + m.intercept;
                if !score.is_finite() {
                    return Err(PredictError::NonFiniteScore);
                }
                let class = if score > 0.0 { m.classes[1] } else { m.classes[0] };
                Ok((class, Some(score)))
            }
            Classifier::MultinomialNb(m) => {
                let mut best: Option<(usize, f64)> = None;
                let mut runner_up = f64::NEG_INFINITY;
                for (i, (prior, row)) in m.class_log_prior.iter().zip(&m.feature_log_prob).enumerate() {
                    let jll = prior + x.dot(row);
                    if !jll.is_finite() {
                        return Err(PredictError::NonFiniteScore);
                    }
                    match best {
                        Some((_, top)) if jll <= top => runner_up = runner_up.max(jll),
                        Some((_, top)) => {
                            runner_up = top;
                            best = Some((i, jll));
                        }
                        None => best = Some((i, jll)),
                    }
                }
                let (idx, top) = best.ok_or(PredictError::NoVotes)?;
                Ok((m.classes[idx], Some(top - runner_up)))
            }
            Classifier::Voting(v) => {
                let mut tally: BTreeMap<i64, f64> = BTreeMap::new();
                let mut total = 0.0;
                for (i, est) in v.estimators.iter().enumerate() {
                    let weight = v.weights.as_ref().and_then(|w| w.get(i)).copied().unwrap_or(1.0);
                    let class = est.predict(x)?;
                    *tally.entry(class).or_insert(0.0) += weight;
                    total += weight;
                }
                if total <= 0.0 {
                    return Err(PredictError::NoVotes);
                }
                // Ascending order with a strict comparison: ties go to the smallest class.
                let mut winner: Option<(i64, f64)> = None;
                for (class, votes) in tally {
                    if winner.map_or(true, |(_, best)| votes > best) {
                        winner = Some((class, votes));
                    }
                }
                let (class, votes) = winner.ok_or(PredictError::NoVotes)?;
                Ok((class, Some(votes / total)))
            }
        }
    }
}

fn incompatible(message: &str) -> ArtifactError {
    ArtifactError::Incompatible(message.to_string())
}

/// Fit a multinomial naive Bayes model with additive (Lidstone) smoothing.
/// Classes are sorted ascending.
pub fn fit_multinomial_nb(
    rows: &[FeatureVector],
    labels: &[i64],
    alpha: f64,
) -> anyhow::Result<Classifier> {
    if rows.len() != labels.len() {
        bail!("{} rows but {} labels", rows.len(), labels.len());
    }
    if !(alpha.is_finite() && alpha > 0.0) {
        bail!("alpha must be positive, got {alpha}");
    }
    let dim = rows.first().map(|r| r.dim).context("no training rows")?;

    let mut classes: Vec<i64> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() < 2 {
        bail!("training data contains a single class");
    }

    let n = rows.len() as f64;
    let mut class_log_prior = Vec::with_capacity(classes.len());
    let mut feature_log_prob = Vec::with_capacity(classes.len());
    for &class in &classes {
        let mut counts = vec![alpha; dim];
        let mut members = 0usize;
        for (row, _) in rows.iter().zip(labels).filter(|(_, l)| **l == class) {
            if row.dim != dim {
                bail!("row has dimension {}, expected {dim}", row.dim);
            }
            members += 1;
            for &(idx, w) in &row.entries {
                counts[idx] += w;
            }
        }
        let total: f64 = counts.iter().sum();
        class_log_prior.push((members as f64 / n).ln());
        feature_log_prob.push(counts.iter().map(|c| (c / total).ln()).collect());
    }

    let model = Classifier::MultinomialNb(NaiveBayesModel {
        classes,
        class_log_prior,
        feature_log_prob,
    });
    model.validate()?;
    Ok(model)
}
