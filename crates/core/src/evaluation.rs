//! Accuracy and per-label metrics for a pipeline against labeled samples.

use crate::error::ClassifyError;
use crate::models::{Label, LabeledSample};
use crate::pipeline::TextClassificationPipeline;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
struct LabelStats {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
    support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    /// Samples the pipeline returned an error for; they count as wrong.
    pub failures: usize,
    pub accuracy: f64,
    pub per_label: BTreeMap<Label, LabelMetrics>,
    /// `confusion[expected][predicted]`, successful predictions only.
    pub confusion: BTreeMap<Label, BTreeMap<Label, usize>>,
}

/// Incremental metrics accumulator.
#[derive(Debug, Default)]
pub struct MetricsCalculator {
    per_label: BTreeMap<Label, LabelStats>,
    confusion: BTreeMap<Label, BTreeMap<Label, usize>>,
    total: usize,
    correct: usize,
    failures: usize,
}

impl MetricsCalculator {
    pub fn push(&mut self, expected: Label, predicted: Option<Label>) {
        self.total += 1;
        self.per_label.entry(expected).or_default().support += 1;
        let Some(predicted) = predicted else {
            self.failures += 1;
            self.per_label.entry(expected).or_default().false_negative += 1;
            return;
        };
        *self
            .confusion
            .entry(expected)
            .or_default()
            .entry(predicted)
            .or_insert(0) += 1;
        if expected == predicted {
            self.correct += 1;
            self.per_label.entry(expected).or_default().true_positive += 1;
        } else {
            self.per_label.entry(expected).or_default().false_negative += 1;
            self.per_label.entry(predicted).or_default().false_positive += 1;
        }
    }

    pub fn finish(self) -> EvaluationReport {
        let per_label = self
            .per_label
            .into_iter()
            .map(|(label, s)| {
                let precision = ratio(s.true_positive, s.true_positive + s.false_positive);
                let recall = ratio(s.true_positive, s.true_positive + s.false_negative);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                (
                    label,
                    LabelMetrics {
                        precision,
                        recall,
                        f1,
                        support: s.support,
                    },
                )
            })
            .collect();
        EvaluationReport {
            total: self.total,
            correct: self.correct,
            failures: self.failures,
            accuracy: ratio(self.correct, self.total),
            per_label,
            confusion: self.confusion,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn evaluate(pipeline: &TextClassificationPipeline, samples: &[LabeledSample]) -> EvaluationReport {
    let mut metrics = MetricsCalculator::default();
    for (i, sample) in samples.iter().enumerate() {
        record(&mut metrics, i, sample, pipeline.classify(&sample.text));
    }
    summarize(metrics)
}

/// Like [`evaluate`], but each sample goes through the bounded deadline path.
pub async fn evaluate_with_deadline(
    pipeline: &Arc<TextClassificationPipeline>,
    samples: &[LabeledSample],
    deadline: Duration,
) -> EvaluationReport {
    let mut metrics = MetricsCalculator::default();
    for (i, sample) in samples.iter().enumerate() {
        let result = pipeline
            .classify_with_deadline(sample.text.clone(), deadline)
            .await;
        record(&mut metrics, i, sample, result);
    }
    summarize(metrics)
}

fn record(
    metrics: &mut MetricsCalculator,
    index: usize,
    sample: &LabeledSample,
    result: Result<Label, ClassifyError>,
) {
    match result {
        Ok(label) => metrics.push(sample.label, Some(label)),
        Err(e) => {
            warn!("Sample {} failed: {}", index, e);
            metrics.push(sample.label, None);
        }
    }
}

fn summarize(metrics: MetricsCalculator) -> EvaluationReport {
    let report = metrics.finish();
    info!(
        "Evaluated {} samples: accuracy {:.3}, {} failures.",
        report.total, report.accuracy, report.failures
    );
    report
}
