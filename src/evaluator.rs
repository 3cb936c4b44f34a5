use serde::Serialize;
use tracing::{debug, info};

use crate::compare::{compare, Tolerance};
use crate::metrics::{DiffRecord, EvaluationMetrics, FieldStatistics};
use crate::value::{Dataset, FieldValue};

/// Comparisons scoring below this similarity are surfaced as diffs.
pub const DIFF_SIMILARITY_THRESHOLD: f64 = 0.999;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EvaluationOptions {
    pub tolerance: Tolerance,
    /// Record a `DiffRecord` for every suspicious comparison.
    pub collect_diffs: bool,
}

/// Compares every non-blank ground-truth field with its prediction and
/// aggregates per-field statistics.
///
/// A document or field missing from `predictions` is compared as an empty
/// string and counted as a missing prediction.
pub fn evaluate_predictions(
    ground_truth: &Dataset,
    predictions: &Dataset,
    options: &EvaluationOptions,
) -> EvaluationMetrics {
    let absent = FieldValue::text("");
    let mut statistics = FieldStatistics::default();
    let mut diffs = Vec::new();

    for (doc_id, expected_fields) in ground_truth {
        let predicted_fields = predictions.get(doc_id);
        if predicted_fields.is_none() {
            debug!(doc_id = %doc_id, "no prediction for document");
        }

        for (field, expected) in expected_fields {
            if expected.is_blank() {
                continue;
            }
            let predicted = predicted_fields
                .and_then(|fields| fields.get(field))
                .unwrap_or(&absent);
            let comparison = compare(expected, predicted, &options.tolerance);
            statistics
                .entry(field)
                .record(&comparison, predicted.is_blank());

            if options.collect_diffs
                && (comparison.similarity < DIFF_SIMILARITY_THRESHOLD
                    || comparison.out_of_tolerance())
            {
                diffs.push(DiffRecord::new(
                    doc_id,
                    field,
                    expected,
                    predicted,
                    &comparison,
                ));
            }
        }
    }

    let metrics = EvaluationMetrics::new(&statistics, diffs);
    info!(
        documents = ground_truth.len(),
        fields = statistics.len(),
        compared = metrics.overall.total,
        diffs = metrics.diffs.len(),
        "evaluation finished"
    );
    metrics
}
