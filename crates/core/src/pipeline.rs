//! Normalize, vectorize, predict.

use crate::artifacts::ArtifactSet;
use crate::config::{AppConfig, ClassificationConfig, EmptyInputPolicy};
use crate::error::{ArtifactError, ClassifyError, NormalizationError};
use crate::models::{Classification, FeatureVector, Label};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub max_input_chars: usize,
    pub empty_input: EmptyInputPolicy,
    /// Blocking jobs allowed to run at once on the deadline path.
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&ClassificationConfig::default())
    }
}

impl From<&ClassificationConfig> for PipelineOptions {
    fn from(cfg: &ClassificationConfig) -> Self {
        Self {
            max_input_chars: cfg.max_input_chars,
            empty_input: cfg.empty_input,
            concurrency: cfg.concurrency,
        }
    }
}

/// Stateless classifier over a shared, immutable [`ArtifactSet`].
///
/// Cloning is cheap and every clone classifies with the same artifacts.
#[derive(Debug, Clone)]
pub struct TextClassificationPipeline {
    artifacts: Arc<ArtifactSet>,
    options: PipelineOptions,
    permits: Arc<Semaphore>,
}

impl TextClassificationPipeline {
    pub fn new(artifacts: Arc<ArtifactSet>) -> Self {
        Self::with_options(artifacts, PipelineOptions::default())
    }

    pub fn with_options(artifacts: Arc<ArtifactSet>, options: PipelineOptions) -> Self {
        Self {
            artifacts,
            options,
            permits: Arc::new(Semaphore::new(options.concurrency.max(1))),
        }
    }

    /// Load artifacts as configured. Errors here are fatal for the caller.
    pub fn from_config(config: &AppConfig) -> Result<Self, ArtifactError> {
        let artifacts = ArtifactSet::load(&config.artifacts)?;
        Ok(Self::with_options(
            Arc::new(artifacts),
            PipelineOptions::from(&config.classification),
        ))
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Deadline-path slots not currently held by a running job.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn normalize(&self, text: &str) -> Result<String, ClassifyError> {
        let chars = text.chars().count();
        if chars > self.options.max_input_chars {
            warn!("Rejected input of {} characters.", chars);
            return Err(NormalizationError::InputTooLarge {
                actual: chars,
                limit: self.options.max_input_chars,
            }
            .into());
        }
        Ok(self.artifacts.linguistic().normalize(text))
    }

    pub fn vectorize(&self, normalized: &str) -> Result<FeatureVector, ClassifyError> {
        Ok(self.artifacts.vectorizer().transform(normalized)?)
    }

    pub fn classify(&self, text: &str) -> Result<Label, ClassifyError> {
        self.classify_detailed(text).map(|c| c.label)
    }

    pub fn classify_detailed(&self, text: &str) -> Result<Classification, ClassifyError> {
        let normalized = self.normalize(text)?;
        if normalized.is_empty() && self.options.empty_input == EmptyInputPolicy::Reject {
            return Err(ClassifyError::EmptyInput);
        }
        let features = self.vectorize(&normalized)?;
        let (class, score) = self.artifacts.classifier().predict_scored(&features)?;
        let label = Label::from_class(class);
        debug!(
            tokens = normalized.split(' ').filter(|t| !t.is_empty()).count(),
            features = features.nnz(),
            class,
            "classified {}",
            label
        );
        Ok(Classification {
            label,
            class,
            score,
            normalized,
            features: features.nnz(),
        })
    }

    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Label, ClassifyError> {
        self.classify_bytes_detailed(bytes).map(|c| c.label)
    }

    pub fn classify_bytes_detailed(&self, bytes: &[u8]) -> Result<Classification, ClassifyError> {
        let text = std::str::from_utf8(bytes).map_err(|e| NormalizationError::InvalidEncoding {
            offset: e.valid_up_to(),
        })?;
        self.classify_detailed(text)
    }

    /// Run on the blocking pool, giving up after `deadline`.
    pub async fn classify_with_deadline(
        self: &Arc<Self>,
        text: String,
        deadline: Duration,
    ) -> Result<Label, ClassifyError> {
        self.with_deadline(deadline, move |p| p.classify(&text)).await
    }

    /// Run `job` on the blocking pool once a concurrency slot is free, giving
    /// up after `deadline`. The slot stays held until `job` returns, even when
    /// the caller has already timed out.
    pub async fn with_deadline<T, F>(
        self: &Arc<Self>,
        deadline: Duration,
        job: F,
    ) -> Result<T, ClassifyError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, ClassifyError> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ClassifyError::Aborted(e.to_string()))?;
        let pipeline = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&pipeline)
        });
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ClassifyError::Aborted(join.to_string())),
            Err(_) => {
                warn!("Classification exceeded {} ms.", deadline.as_millis());
                Err(ClassifyError::Timeout {
                    millis: deadline.as_millis(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classifier, LinearModel};
    use crate::linguistic::LinguisticModel;
    use crate::vectorizer::{FitOptions, TfIdfVectorizer};

    fn pipeline(policy: EmptyInputPolicy) -> TextClassificationPipeline {
        let docs = vec!["senate budget".to_string(), "miracle shock".to_string()];
        let vectorizer = TfIdfVectorizer::fit(&docs, &FitOptions::default()).unwrap();
        // columns: budget, miracle, senate, shock
        let classifier = Classifier::Linear(LinearModel {
            coef: vec![1.0, -1.0, 1.0, -1.0],
            intercept: -0.1,
            classes: [0, 1],
        });
        let set = ArtifactSet::from_parts(LinguisticModel::english().unwrap(), vectorizer, classifier)
            .unwrap();
        TextClassificationPipeline::with_options(
            Arc::new(set),
            PipelineOptions {
                max_input_chars: 64,
                empty_input: policy,
                concurrency: 1,
            },
        )
    }

    #[test]
    fn pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TextClassificationPipeline>();
    }

    #[test]
    fn labels_follow_the_model() {
        let p = pipeline(EmptyInputPolicy::Model);
        assert_eq!(p.classify("The Senate passed the budget").unwrap(), Label::Real);
        assert_eq!(p.classify("A miracle! Shocking!").unwrap(), Label::Fake);
    }

    #[test]
    fn classification_is_deterministic() {
        let p = pipeline(EmptyInputPolicy::Model);
        let text = "Senate shock budget miracle senate";
        let first = p.classify_detailed(text).unwrap();
        for _ in 0..10 {
            let again = p.classify_detailed(text).unwrap();
            assert_eq!(again.label, first.label);
            assert_eq!(again.score, first.score);
        }
    }

    #[test]
    fn empty_input_uses_the_model_by_default() {
        let p = pipeline(EmptyInputPolicy::Model);
        assert_eq!(p.normalize("the a an is of , . ! ?").unwrap(), "");
        // Zero vector gives score -0.1, the negative class.
        assert_eq!(p.classify("the a an is of , . ! ?").unwrap(), Label::Fake);
        assert_eq!(p.classify("").unwrap(), Label::Fake);
    }

    #[test]
    fn empty_input_can_be_rejected() {
        let p = pipeline(EmptyInputPolicy::Reject);
        assert_eq!(p.classify("   "), Err(ClassifyError::EmptyInput));
    }

    #[test]
    fn oversized_input_is_a_normalization_error() {
        let p = pipeline(EmptyInputPolicy::Model);
        let err = p.classify(&"word ".repeat(20)).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::Normalization(NormalizationError::InputTooLarge {
                actual: 100,
                limit: 64
            })
        );
    }

    #[test]
    fn invalid_utf8_is_reported_with_offset() {
        let p = pipeline(EmptyInputPolicy::Model);
        let err = p.classify_bytes(b"senate \xff budget").unwrap_err();
        assert_eq!(
            err,
            ClassifyError::Normalization(NormalizationError::InvalidEncoding { offset: 7 })
        );
        assert_eq!(p.classify_bytes(b"senate budget").unwrap(), Label::Real);
    }

    #[tokio::test]
    async fn deadline_path_matches_sync_path() {
        let p = Arc::new(pipeline(EmptyInputPolicy::Model));
        let label = p
            .classify_with_deadline("Senate budget".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(label, p.classify("Senate budget").unwrap());
    }

    #[tokio::test]
    async fn timed_out_job_keeps_its_slot_until_it_finishes() {
        let docs = vec!["senate budget".to_string()];
        let vectorizer = TfIdfVectorizer::fit(&docs, &FitOptions::default()).unwrap();
        let classifier = Classifier::Linear(LinearModel {
            coef: vec![1.0, 1.0],
            intercept: 0.0,
            classes: [0, 1],
        });
        let set = ArtifactSet::from_parts(LinguisticModel::english().unwrap(), vectorizer, classifier)
            .unwrap();
        let p = Arc::new(TextClassificationPipeline::with_options(
            Arc::new(set),
            PipelineOptions {
                max_input_chars: usize::MAX,
                empty_input: EmptyInputPolicy::Model,
                concurrency: 1,
            },
        ));
        let slow = "senators debated the budgets ".repeat(100_000);

        let err = p
            .classify_with_deadline(slow, Duration::from_nanos(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Timeout { .. }));
        assert_eq!(p.available_permits(), 0);

        for _ in 0..600 {
            if p.available_permits() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(p.available_permits(), 1);
    }

    #[test]
    fn detailed_bytes_path_reports_normalized_text() {
        let p = pipeline(EmptyInputPolicy::Model);
        let c = p.classify_bytes_detailed("Senate budgets".as_bytes()).unwrap();
        assert_eq!(c.normalized, "senate budget");
        assert_eq!(c.label, Label::Real);
    }
}
