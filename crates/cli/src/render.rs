use newscheck_core::evaluation::EvaluationReport;
use newscheck_core::models::Classification;

pub fn classification_line(c: &Classification) -> String {
    c.label.to_string()
}

pub fn classification_json(c: &Classification) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "status": "ok",
        "label": c.label,
        "class": c.class,
        "score": c.score,
        "features": c.features,
        "normalized": c.normalized,
    }))
}

pub fn report_text(report: &EvaluationReport) -> String {
    let mut out = format!(
        "samples {}, correct {}, failures {}, accuracy {:.3}\n",
        report.total, report.correct, report.failures, report.accuracy
    );
    for (label, m) in &report.per_label {
        out.push_str(&format!(
            "{:<5} precision {:.3} recall {:.3} f1 {:.3} support {}\n",
            label.as_str(),
            m.precision,
            m.recall,
            m.f1,
            m.support
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use newscheck_core::models::Label;

    #[test]
    fn json_carries_label_and_score() {
        let c = Classification {
            label: Label::Real,
            class: 1,
            score: Some(0.25),
            normalized: "senate pass budget".to_string(),
            features: 3,
        };
        let parsed: serde_json::Value = serde_json::from_str(&classification_json(&c).unwrap()).unwrap();
        assert_eq!(parsed["label"], "Real");
        assert_eq!(parsed["score"], 0.25);
        assert_eq!(classification_line(&c), "Real");
    }
}
