//! CSV and JSON outputs of an evaluation run.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::error::EvaluationError;
use crate::evaluator::EvaluationOptions;
use crate::metrics::{DiffRecord, EvaluationMetrics, FieldMetrics};

/// Header of the per-field report, in `FieldMetrics` field order.
pub const REPORT_COLUMNS: [&str; 10] = [
    "field",
    "total",
    "exact_matches",
    "exact_match_rate",
    "avg_similarity",
    "numeric_comparable",
    "numeric_within_tolerance",
    "numeric_within_tolerance_rate",
    "missing_predictions",
    "missing_rate",
];

/// Writes one row per field, a blank separator row and the overall row.
pub fn write_report(path: &Path, metrics: &EvaluationMetrics) -> Result<(), EvaluationError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(REPORT_COLUMNS)?;
    for row in &metrics.fields {
        writer.serialize(row)?;
    }
    writer.write_record(vec![""; REPORT_COLUMNS.len()])?;
    writer.serialize(&metrics.overall)?;
    writer.flush()?;
    Ok(())
}

/// Writes the flagged comparisons. Returns `false` without touching the
/// filesystem when there is nothing to write.
pub fn write_diffs(path: &Path, diffs: &[DiffRecord]) -> Result<bool, EvaluationError> {
    if diffs.is_empty() {
        return Ok(false);
    }
    let mut writer = csv::Writer::from_path(path)?;
    for diff in diffs {
        writer.serialize(diff)?;
    }
    writer.flush()?;
    Ok(true)
}

/// Lines printed to stdout once a run completes.
pub fn console_summary(metrics: &EvaluationMetrics) -> Vec<String> {
    vec![
        format!(
            "Overall exact match rate: {:.3}",
            metrics.overall.exact_match_rate
        ),
        format!("Overall avg similarity: {:.3}", metrics.overall.avg_similarity),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDigest {
    pub path: String,
    pub sha256: String,
}

impl InputDigest {
    pub fn from_path(path: &Path) -> Result<Self, EvaluationError> {
        let bytes = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Self {
            path: path.display().to_string(),
            sha256: format!("{:x}", hasher.finalize()),
        })
    }
}

/// Machine-readable record of a run, tied to the exact input files.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub ground_truth: InputDigest,
    pub predictions: InputDigest,
    pub options: &'a EvaluationOptions,
    pub fields_evaluated: usize,
    pub diff_count: usize,
    pub overall: &'a FieldMetrics,
}

impl<'a> RunSummary<'a> {
    pub fn new(
        ground_truth: &Path,
        predictions: &Path,
        options: &'a EvaluationOptions,
        metrics: &'a EvaluationMetrics,
    ) -> Result<Self, EvaluationError> {
        Ok(Self {
            ground_truth: InputDigest::from_path(ground_truth)?,
            predictions: InputDigest::from_path(predictions)?,
            options,
            fields_evaluated: metrics.fields.len(),
            diff_count: metrics.diffs.len(),
            overall: &metrics.overall,
        })
    }
}

pub fn write_summary_json(path: &Path, summary: &RunSummary<'_>) -> Result<(), EvaluationError> {
    let payload = serde_json::to_string_pretty(summary)?;
    fs::write(path, payload + "\n")?;
    Ok(())
}
