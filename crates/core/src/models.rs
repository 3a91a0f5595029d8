use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw class value the classifiers emit for genuine articles.
pub const REAL_CLASS: i64 = 1;
/// Raw class value used for fabricated articles when training.
pub const FAKE_CLASS: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(alias = "real", alias = "REAL")]
    Real,
    #[serde(alias = "fake", alias = "FAKE")]
    Fake,
}

impl Label {
    /// `1` is `Real`; every other class value is `Fake`.
    pub fn from_class(class: i64) -> Self {
        if class == REAL_CLASS {
            Label::Real
        } else {
            Label::Fake
        }
    }

    pub fn class(self) -> i64 {
        match self {
            Label::Real => REAL_CLASS,
            Label::Fake => FAKE_CLASS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Real => "Real",
            Label::Fake => "Fake",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sparse TF-IDF row: sorted `(column, weight)` pairs over `dim` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dim: usize,
    pub entries: Vec<(usize, f64)>,
}

impl FeatureVector {
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
        }
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|(_, w)| *w == 0.0)
    }

    /// Dot product against a dense weight row of the same dimension.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|(idx, w)| dense.get(*idx).copied().unwrap_or(0.0) * w)
            .sum()
    }
}

/// Full result of one classification, used for JSON output and evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub label: Label,
    pub class: i64,
    pub score: Option<f64>,
    pub normalized: String,
    pub features: usize,
}

/// One labeled example for training and evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledSample {
    pub text: String,
    pub label: Label,
}
