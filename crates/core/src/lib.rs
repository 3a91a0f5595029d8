//! Core library: linguistic normalization, TF-IDF features, frozen classifiers
//! and the pipeline that ties them together.

pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod linguistic;
pub mod models;
pub mod pipeline;
pub mod training;
pub mod vectorizer;

pub use artifacts::ArtifactSet;
pub use error::{ArtifactError, ClassifyError};
pub use models::Label;
pub use pipeline::TextClassificationPipeline;
