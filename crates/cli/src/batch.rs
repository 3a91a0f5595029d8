//! JSONL fan-out over a shared pipeline.

use newscheck_core::models::Label;
use newscheck_core::TextClassificationPipeline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct BatchRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// 1-based line number in the input.
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn failed(line: usize, id: Option<serde_json::Value>, error: String) -> Self {
        Self {
            line,
            id,
            label: None,
            error: Some(error),
        }
    }
}

/// Classify every non-blank line. The pipeline bounds how many run at once;
/// results come back in input order and per-line failures are kept in-line.
pub async fn classify_lines(
    pipeline: Arc<TextClassificationPipeline>,
    input: &str,
    deadline: Duration,
) -> Vec<BatchResult> {
    let mut pending = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let record: BatchRecord = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping malformed line {}: {}", line, e);
                pending.push(Pending::Done(BatchResult::failed(
                    line,
                    None,
                    format!("invalid record: {e}"),
                )));
                continue;
            }
        };
        let pipeline = Arc::clone(&pipeline);
        let id = record.id.clone();
        let handle = tokio::spawn(async move {
            match pipeline.classify_with_deadline(record.text, deadline).await {
                Ok(label) => BatchResult {
                    line,
                    id: record.id,
                    label: Some(label),
                    error: None,
                },
                Err(e) => BatchResult::failed(line, record.id, e.to_string()),
            }
        });
        pending.push(Pending::Running { line, id, handle });
    }

    let mut results = Vec::with_capacity(pending.len());
    for p in pending {
        results.push(match p {
            Pending::Done(r) => r,
            Pending::Running { line, id, handle } => settle(line, id, handle.await),
        });
    }
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    info!("Batch complete: {} records, {} failed.", results.len(), failed);
    results
}

enum Pending {
    Done(BatchResult),
    Running {
        line: usize,
        id: Option<serde_json::Value>,
        handle: JoinHandle<BatchResult>,
    },
}

/// A task that died still yields a row for its line.
fn settle(
    line: usize,
    id: Option<serde_json::Value>,
    joined: Result<BatchResult, JoinError>,
) -> BatchResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            warn!("Batch task for line {} failed: {}", line, e);
            BatchResult::failed(line, id, format!("task failed: {e}"))
        }
    }
}
