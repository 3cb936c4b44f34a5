use indexmap::IndexMap;
use serde::Serialize;

use crate::compare::Comparison;
use crate::value::FieldValue;

/// Name of the summary row that aggregates every field.
pub const OVERALL_FIELD: &str = "__overall__";

/// Running counters for one field across all documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStatistic {
    pub total: u32,
    pub exact_matches: u32,
    pub similarity_sum: f64,
    pub numeric_comparable: u32,
    pub numeric_within_tolerance: u32,
    pub missing_predictions: u32,
}

impl FieldStatistic {
    pub fn record(&mut self, comparison: &Comparison, prediction_missing: bool) {
        self.total += 1;
        if prediction_missing {
            self.missing_predictions += 1;
        }
        if comparison.exact {
            self.exact_matches += 1;
        }
        self.similarity_sum += comparison.similarity;
        if let Some(within) = comparison.within_tolerance {
            self.numeric_comparable += 1;
            if within {
                self.numeric_within_tolerance += 1;
            }
        }
    }

    fn absorb(&mut self, other: &FieldStatistic) {
        self.total += other.total;
        self.exact_matches += other.exact_matches;
        self.similarity_sum += other.similarity_sum;
        self.numeric_comparable += other.numeric_comparable;
        self.numeric_within_tolerance += other.numeric_within_tolerance;
        self.missing_predictions += other.missing_predictions;
    }

    pub fn metrics(&self, field: &str) -> FieldMetrics {
        FieldMetrics {
            field: field.to_string(),
            total: self.total,
            exact_matches: self.exact_matches,
            exact_match_rate: rate(f64::from(self.exact_matches), self.total),
            avg_similarity: rate(self.similarity_sum, self.total),
            numeric_comparable: self.numeric_comparable,
            numeric_within_tolerance: self.numeric_within_tolerance,
            numeric_within_tolerance_rate: (self.numeric_comparable > 0).then(|| {
                f64::from(self.numeric_within_tolerance) / f64::from(self.numeric_comparable)
            }),
            missing_predictions: self.missing_predictions,
            missing_rate: rate(f64::from(self.missing_predictions), self.total),
        }
    }
}

fn rate(numerator: f64, total: u32) -> f64 {
    if total > 0 {
        numerator / f64::from(total)
    } else {
        0.0
    }
}

/// Per-field counters in the order fields were first encountered.
#[derive(Debug, Clone, Default)]
pub struct FieldStatistics {
    fields: IndexMap<String, FieldStatistic>,
}

impl FieldStatistics {
    /// Returns the counters for `field`, creating them on first use.
    pub fn entry(&mut self, field: &str) -> &mut FieldStatistic {
        if !self.fields.contains_key(field) {
            self.fields.insert(field.to_string(), FieldStatistic::default());
        }
        &mut self.fields[field]
    }

    pub fn get(&self, field: &str) -> Option<&FieldStatistic> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Counters summed over every field.
    pub fn overall(&self) -> FieldStatistic {
        let mut overall = FieldStatistic::default();
        for statistic in self.fields.values() {
            overall.absorb(statistic);
        }
        overall
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldStatistic)> {
        self.fields.iter().map(|(field, stat)| (field.as_str(), stat))
    }
}

/// Derived rates for one field (or for the overall summary row).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMetrics {
    pub field: String,
    pub total: u32,
    pub exact_matches: u32,
    pub exact_match_rate: f64,
    pub avg_similarity: f64,
    pub numeric_comparable: u32,
    pub numeric_within_tolerance: u32,
    pub numeric_within_tolerance_rate: Option<f64>,
    pub missing_predictions: u32,
    pub missing_rate: f64,
}

/// A comparison flagged for manual review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRecord {
    pub docid: String,
    pub field: String,
    pub ground_truth: String,
    pub prediction: String,
    pub similarity: f64,
    pub gt_num: Option<f64>,
    pub pred_num: Option<f64>,
}

impl DiffRecord {
    pub fn new(
        doc_id: &str,
        field: &str,
        ground_truth: &FieldValue,
        prediction: &FieldValue,
        comparison: &Comparison,
    ) -> Self {
        Self {
            docid: doc_id.to_string(),
            field: field.to_string(),
            ground_truth: ground_truth.raw_text(),
            prediction: prediction.raw_text(),
            similarity: round(comparison.similarity),
            gt_num: comparison.ground_truth_number,
            pred_num: comparison.predicted_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    /// Sorted by descending `total`, ties kept in first-encounter order.
    pub fields: Vec<FieldMetrics>,
    pub overall: FieldMetrics,
    pub diffs: Vec<DiffRecord>,
}

impl EvaluationMetrics {
    pub fn new(statistics: &FieldStatistics, diffs: Vec<DiffRecord>) -> Self {
        let mut fields: Vec<FieldMetrics> = statistics
            .iter()
            .map(|(field, statistic)| statistic.metrics(field))
            .collect();
        fields.sort_by(|a, b| b.total.cmp(&a.total));
        Self {
            fields,
            overall: statistics.overall().metrics(OVERALL_FIELD),
            diffs,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetrics> {
        self.fields.iter().find(|metrics| metrics.field == name)
    }
}

fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
