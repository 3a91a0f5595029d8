//! Frozen TF-IDF transform.
//!
//! The artifact is a JSON document; weights are computed the same way the
//! fitting side computes them so that a vectorizer produced by `fit` and one
//! read back from disk transform identically.

use crate::error::{ArtifactError, VectorizeError};
use crate::models::FeatureVector;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";
/// Longest n-gram an artifact may ask for.
pub const MAX_NGRAM: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    #[default]
    L2,
    L1,
    None,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorizerFile {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
    #[serde(default = "default_ngram_range")]
    ngram_range: (usize, usize),
    #[serde(default)]
    sublinear_tf: bool,
    #[serde(default)]
    norm: Norm,
    #[serde(default = "default_token_pattern")]
    token_pattern: String,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

/// Options for building a vectorizer from a corpus.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Maximum share of documents a term may appear in.
    pub max_df: f64,
    pub ngram_range: (usize, usize),
    pub sublinear_tf: bool,
    pub norm: Norm,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            min_df: 1,
            max_df: 1.0,
            ngram_range: (1, 1),
            sublinear_tf: false,
            norm: Norm::L2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    vocabulary: HashMap<String, usize>,
    terms: Vec<String>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
    sublinear_tf: bool,
    norm: Norm,
    token_pattern: String,
    pattern: Regex,
}

impl TfIdfVectorizer {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: VectorizerFile =
            serde_json::from_str(&raw).map_err(|e| ArtifactError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::from_file(file)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ArtifactError> {
        let file: VectorizerFile = serde_json::from_str(raw).map_err(|e| ArtifactError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        Self::from_file(file)
    }

    fn from_file(file: VectorizerFile) -> Result<Self, ArtifactError> {
        let n = file.vocabulary.len();
        if file.idf.len() != n {
            return Err(ArtifactError::Incompatible(format!(
                "vectorizer has {n} terms but {} idf weights",
                file.idf.len()
            )));
        }
        if let Some(pos) = file.idf.iter().position(|w| !w.is_finite()) {
            return Err(ArtifactError::Incompatible(format!(
                "idf weight at column {pos} is not finite"
            )));
        }
        let (lo, hi) = file.ngram_range;
        if lo == 0 || lo > hi || hi > MAX_NGRAM {
            return Err(ArtifactError::Incompatible(format!(
                "invalid ngram_range ({lo}, {hi})"
            )));
        }
        let mut terms = vec![String::new(); n];
        let mut seen = HashSet::with_capacity(n);
        for (term, &idx) in &file.vocabulary {
            if idx >= n || !seen.insert(idx) {
                return Err(ArtifactError::Incompatible(format!(
                    "vocabulary column {idx} for {term:?} is out of range or duplicated"
                )));
            }
            terms[idx] = term.clone();
        }
        let pattern = Regex::new(&file.token_pattern).map_err(|e| ArtifactError::InvalidPattern {
            pattern: file.token_pattern.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            vocabulary: file.vocabulary.into_iter().collect(),
            terms,
            idf: file.idf,
            ngram_range: file.ngram_range,
            sublinear_tf: file.sublinear_tf,
            norm: file.norm,
            token_pattern: file.token_pattern,
            pattern,
        })
    }

    /// Learn a vocabulary and smoothed idf from normalized documents.
    /// Columns are assigned in lexicographic term order.
    pub fn fit(documents: &[String], options: &FitOptions) -> Result<Self, ArtifactError> {
        let pattern = Regex::new(DEFAULT_TOKEN_PATTERN).map_err(|e| ArtifactError::InvalidPattern {
            pattern: DEFAULT_TOKEN_PATTERN.to_string(),
            message: e.to_string(),
        })?;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let unique: HashSet<String> = terms_of(&pattern, options.ngram_range, doc)
                .into_iter()
                .collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let n_docs = documents.len();
        let max_count = options.max_df * n_docs as f64;
        let mut kept: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= options.min_df && *df as f64 <= max_count)
            .collect();
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (idx, (term, df)) in kept.into_iter().enumerate() {
            idf.push(((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0);
            vocabulary.insert(term, idx);
        }
        tracing::debug!(terms = idf.len(), documents = n_docs, "fitted tf-idf vocabulary");

        Self::from_file(VectorizerFile {
            vocabulary,
            idf,
            ngram_range: options.ngram_range,
            sublinear_tf: options.sublinear_tf,
            norm: options.norm,
            token_pattern: DEFAULT_TOKEN_PATTERN.to_string(),
        })
    }

    pub fn dim(&self) -> usize {
        self.idf.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    pub fn norm(&self) -> Norm {
        self.norm
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Terms in column order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn transform(&self, normalized: &str) -> Result<FeatureVector, VectorizeError> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms_of(&self.pattern, self.ngram_range, normalized) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut entries = Vec::with_capacity(counts.len());
        for (idx, count) in counts {
            let tf = if self.sublinear_tf { 1.0 + count.ln() } else { count };
            let weight = tf * self.idf[idx];
            if !weight.is_finite() {
                return Err(VectorizeError::NonFinite {
                    term: self.terms[idx].clone(),
                });
            }
            entries.push((idx, weight));
        }

        let scale = match self.norm {
            Norm::L2 => entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt(),
            Norm::L1 => entries.iter().map(|(_, w)| w.abs()).sum::<f64>(),
            Norm::None => 1.0,
        };
        if scale > 0.0 && scale != 1.0 {
            for (idx, w) in entries.iter_mut() {
                *w /= scale;
                if !w.is_finite() {
                    return Err(VectorizeError::NonFinite {
                        term: self.terms[*idx].clone(),
                    });
                }
            }
        }

        Ok(FeatureVector {
            dim: self.dim(),
            entries,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let file = VectorizerFile {
            vocabulary: self
                .vocabulary
                .iter()
                .map(|(t, i)| (t.clone(), *i))
                .collect(),
            idf: self.idf.clone(),
            ngram_range: self.ngram_range,
            sublinear_tf: self.sublinear_tf,
            norm: self.norm,
            token_pattern: self.token_pattern.clone(),
        };
        serde_json::to_string_pretty(&file)
    }
}

fn terms_of(pattern: &Regex, (lo, hi): (usize, usize), text: &str) -> Vec<String> {
    let tokens: Vec<&str> = pattern.find_iter(text).map(|m| m.as_str()).collect();
    let mut out = Vec::new();
    for n in lo.max(1)..=hi.min(tokens.len()) {
        for window in tokens.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "senate pass budget bill".to_string(),
            "senate debate budget".to_string(),
            "shock miracle cure doctor hate".to_string(),
        ]
    }

    #[test]
    fn fit_assigns_sorted_columns_and_smoothed_idf() {
        let vec = TfIdfVectorizer::fit(&corpus(), &FitOptions::default()).unwrap();
        assert_eq!(vec.terms()[0], "bill");
        let budget = vec.terms().iter().position(|t| t == "budget").unwrap();
        let cure = vec.terms().iter().position(|t| t == "cure").unwrap();
        // df(budget) = 2, df(cure) = 1, n = 3
        assert!((vec.idf()[budget] - ((4.0f64 / 3.0).ln() + 1.0)).abs() < 1e-12);
        assert!((vec.idf()[cure] - (2.0f64.ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn out_of_vocabulary_terms_are_ignored() {
        let vec = TfIdfVectorizer::fit(&corpus(), &FitOptions::default()).unwrap();
        let fv = vec.transform("budget zebra quantum").unwrap();
        assert_eq!(fv.dim, vec.dim());
        assert_eq!(fv.nnz(), 1);
        assert!((fv.entries[0].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_is_the_zero_vector() {
        let vec = TfIdfVectorizer::fit(&corpus(), &FitOptions::default()).unwrap();
        let fv = vec.transform("").unwrap();
        assert_eq!(fv, FeatureVector::zeros(vec.dim()));
        assert!(fv.is_zero());
    }

    #[test]
    fn l2_rows_have_unit_length() {
        let vec = TfIdfVectorizer::fit(&corpus(), &FitOptions::default()).unwrap();
        let fv = vec.transform("senate budget budget cure").unwrap();
        let len: f64 = fv.entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        assert!((len - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_character_tokens_are_not_terms() {
        let vec = TfIdfVectorizer::fit(&["a b cd".to_string()], &FitOptions::default()).unwrap();
        assert_eq!(vec.terms(), ["cd".to_string()]);
    }

    #[test]
    fn bigrams_and_min_df() {
        let options = FitOptions {
            min_df: 2,
            ngram_range: (1, 2),
            ..FitOptions::default()
        };
        let vec = TfIdfVectorizer::fit(&corpus(), &options).unwrap();
        assert!(vec.contains("senate"));
        assert!(vec.contains("budget"));
        assert!(!vec.contains("cure"));
        assert!(!vec.contains("senate pass"));
    }

    #[test]
    fn max_df_is_a_share_of_documents() {
        let docs = vec![
            "alpha beta".to_string(),
            "alpha gamma".to_string(),
            "delta".to_string(),
        ];
        let options = FitOptions {
            max_df: 0.5,
            ..FitOptions::default()
        };
        let vec = TfIdfVectorizer::fit(&docs, &options).unwrap();
        assert_eq!(vec.terms(), ["beta", "delta", "gamma"].map(String::from));
    }

    #[test]
    fn sublinear_tf_dampens_repeats() {
        let options = FitOptions {
            sublinear_tf: true,
            norm: Norm::None,
            ..FitOptions::default()
        };
        let vec = TfIdfVectorizer::fit(&corpus(), &options).unwrap();
        let cure = vec.terms().iter().position(|t| t == "cure").unwrap();
        let fv = vec.transform("cure cure cure").unwrap();
        let expected = (1.0 + 3.0f64.ln()) * vec.idf()[cure];
        assert_eq!(fv.nnz(), 1);
        assert!((fv.entries[0].1 - expected).abs() < 1e-12);
    }

    #[test]
    fn l1_rows_sum_to_one() {
        let options = FitOptions {
            norm: Norm::L1,
            ..FitOptions::default()
        };
        let vec = TfIdfVectorizer::fit(&corpus(), &options).unwrap();
        let fv = vec.transform("senate budget budget cure").unwrap();
        let total: f64 = fv.entries.iter().map(|(_, w)| w.abs()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_norm_keeps_raw_tf_idf() {
        let options = FitOptions {
            norm: Norm::None,
            ..FitOptions::default()
        };
        let vec = TfIdfVectorizer::fit(&corpus(), &options).unwrap();
        let budget = vec.terms().iter().position(|t| t == "budget").unwrap();
        let fv = vec.transform("budget budget").unwrap();
        assert_eq!(fv.entries, vec![(budget, 2.0 * vec.idf()[budget])]);
    }

    #[test]
    fn oversized_ngram_range_is_rejected() {
        let raw = format!(
            r#"{{"vocabulary": {{"alpha": 0}}, "idf": [1.0], "ngram_range": [1, {}]}}"#,
            usize::MAX
        );
        let err = TfIdfVectorizer::from_json_str(&raw).unwrap_err();
        assert!(matches!(err, ArtifactError::Incompatible(_)));
    }

    #[test]
    fn ngram_range_wider_than_input_is_bounded() {
        let raw = r#"{"vocabulary": {"alpha": 0, "alpha beta": 1}, "idf": [1.0, 1.0], "ngram_range": [1, 16]}"#;
        let vec = TfIdfVectorizer::from_json_str(raw).unwrap();
        assert_eq!(vec.transform("alpha").unwrap().nnz(), 1);
        assert_eq!(vec.transform("alpha beta").unwrap().nnz(), 2);
    }

    #[test]
    fn json_round_trip_transforms_identically() {
        let vec = TfIdfVectorizer::fit(&corpus(), &FitOptions::default()).unwrap();
        let back = TfIdfVectorizer::from_json_str(&vec.to_json().unwrap()).unwrap();
        let text = "senate budget doctor";
        assert_eq!(vec.transform(text).unwrap(), back.transform(text).unwrap());
    }

    #[test]
    fn mismatched_idf_length_is_rejected() {
        let raw = r#"{"vocabulary": {"alpha": 0, "beta": 1}, "idf": [1.0]}"#;
        let err = TfIdfVectorizer::from_json_str(raw).unwrap_err();
        assert!(matches!(err, ArtifactError::Incompatible(_)));
    }

    #[test]
    fn bad_token_pattern_is_rejected() {
        let raw = r#"{"vocabulary": {}, "idf": [], "token_pattern": "(unclosed"}"#;
        let err = TfIdfVectorizer::from_json_str(raw).unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidPattern { .. }));
    }
}
