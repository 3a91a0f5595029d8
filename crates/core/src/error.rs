//! Error taxonomy for artifact loading and per-request classification.

use std::path::PathBuf;
use thiserror::Error;

/// Startup failure: one of the three artifacts is missing, malformed or
/// inconsistent with the others. The pipeline cannot be built.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse artifact {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("incompatible artifacts: {0}")]
    Incompatible(String),
    #[error("checksum mismatch for {name}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("invalid token pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("input is not valid UTF-8 (first bad byte at offset {offset})")]
    InvalidEncoding { offset: usize },
    #[error("input has {actual} characters, limit is {limit}")]
    InputTooLarge { actual: usize, limit: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum VectorizeError {
    #[error("non-finite weight for term {term:?}")]
    NonFinite { term: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    #[error("feature vector has dimension {actual}, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("classifier produced a non-finite score")]
    NonFiniteScore,
    #[error("ensemble has no voting members")]
    NoVotes,
}

/// Request-level failure. Callers always get one of these or a label, never
/// both and never neither.
#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("normalization failed: {0}")]
    Normalization(#[from] NormalizationError),
    #[error("vectorization failed: {0}")]
    Vectorization(#[from] VectorizeError),
    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictError),
    #[error("input has no content words after normalization")]
    EmptyInput,
    #[error("classification exceeded {millis} ms")]
    Timeout { millis: u128 },
    #[error("classification task aborted: {0}")]
    Aborted(String),
}
