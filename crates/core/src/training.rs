use crate::classifier::{fit_multinomial_nb, Classifier};
use crate::linguistic::LinguisticModel;
use crate::models::LabeledSample;
use crate::vectorizer::{FitOptions, TfIdfVectorizer};
use anyhow::{bail, Context};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub fit: FitOptions,
    /// Additive smoothing for naive Bayes.
    pub alpha: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            alpha: 1.0,
        }
    }
}

/// Fit a vectorizer and a multinomial naive Bayes classifier on `samples`,
/// normalizing each text with `linguistic` first.
pub fn train(
    samples: &[LabeledSample],
    linguistic: &LinguisticModel,
    options: &TrainOptions,
) -> anyhow::Result<(TfIdfVectorizer, Classifier)> {
    if samples.is_empty() {
        bail!("no training samples");
    }
    let normalized: Vec<String> = samples.iter().map(|s| linguistic.normalize(&s.text)).collect();
    let vectorizer = TfIdfVectorizer::fit(&normalized, &options.fit)?;
    if vectorizer.dim() == 0 {
        bail!("training corpus produced an empty vocabulary");
    }
    let rows = normalized
        .iter()
        .map(|doc| vectorizer.transform(doc))
        .collect::<Result<Vec<_>, _>>()?;
    let labels: Vec<i64> = samples.iter().map(|s| s.label.class()).collect();
    let classifier = fit_multinomial_nb(&rows, &labels, options.alpha)?;
    info!(
        "Trained on {} samples with {} terms.",
        samples.len(),
        vectorizer.dim()
    );
    Ok((vectorizer, classifier))
}

/// Read `{"text": .., "label": ..}` lines; blank lines are skipped.
pub fn load_samples(path: &Path) -> anyhow::Result<Vec<LabeledSample>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut samples = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let sample: LabeledSample = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid sample", path.display(), i + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;

    fn sample(text: &str, label: Label) -> LabeledSample {
        LabeledSample {
            text: text.to_string(),
            label,
        }
    }

    #[test]
    fn trained_model_matches_vocabulary() {
        let samples = vec![
            sample("Parliament approved the annual budget", Label::Real),
            sample("Doctors hate this miracle trick", Label::Fake),
        ];
        let model = LinguisticModel::english().unwrap();
        let (vec, clf) = train(&samples, &model, &TrainOptions::default()).unwrap();
        assert_eq!(clf.input_dim(), Some(vec.dim()));
        assert!(vec.contains("budget"));
        assert!(vec.contains("miracle"));
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let model = LinguisticModel::english().unwrap();
        assert!(train(&[], &model, &TrainOptions::default()).is_err());
    }

    #[test]
    fn samples_load_from_jsonl() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("train.jsonl");
        fs::write(
            &path,
            "{\"text\": \"a\", \"label\": \"real\"}\n\n{\"text\": \"b\", \"label\": \"Fake\"}\n",
        )
        .unwrap();
        let samples = load_samples(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].label, Label::Fake);
    }
}
