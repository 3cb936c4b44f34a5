use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::value::FieldValue;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("non-word pattern must compile"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));
static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.\-eE%]").expect("numeric pattern must compile"));

/// How the numeric tolerance is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    Absolute,
    /// Scales with the ground-truth magnitude, never below the raw tolerance.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub mode: ToleranceMode,
    pub value: f64,
}

impl Tolerance {
    pub fn absolute(value: f64) -> Self {
        Self {
            mode: ToleranceMode::Absolute,
            value,
        }
    }

    pub fn relative(value: f64) -> Self {
        Self {
            mode: ToleranceMode::Relative,
            value,
        }
    }

    pub fn within(&self, ground_truth: f64, predicted: f64) -> bool {
        let allowed = match self.mode {
            ToleranceMode::Absolute => self.value,
            ToleranceMode::Relative => self.value.max(self.value * ground_truth.abs()),
        };
        (ground_truth - predicted).abs() <= allowed
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::absolute(1e-6)
    }
}

/// Result of comparing one ground-truth value with its prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub exact: bool,
    pub similarity: f64,
    pub ground_truth_number: Option<f64>,
    pub predicted_number: Option<f64>,
    /// `None` unless both sides parsed as numbers.
    pub within_tolerance: Option<bool>,
}

impl Comparison {
    pub fn numeric_comparable(&self) -> bool {
        self.within_tolerance.is_some()
    }

    pub fn out_of_tolerance(&self) -> bool {
        self.within_tolerance == Some(false)
    }
}

pub fn compare(ground_truth: &FieldValue, predicted: &FieldValue, tolerance: &Tolerance) -> Comparison {
    let ground_truth_number = parse_number(ground_truth);
    let predicted_number = parse_number(predicted);
    let within_tolerance = match (ground_truth_number, predicted_number) {
        (Some(expected), Some(actual)) => Some(tolerance.within(expected, actual)),
        _ => None,
    };
    Comparison {
        exact: exact_match(ground_truth, predicted),
        similarity: similarity(ground_truth, predicted),
        ground_truth_number,
        predicted_number,
        within_tolerance,
    }
}

pub fn exact_match(a: &FieldValue, b: &FieldValue) -> bool {
    a.raw_text().trim() == b.raw_text().trim()
}

/// Lowercases, turns punctuation into spaces and collapses whitespace.
pub fn normalize_text(value: &FieldValue) -> String {
    let lowered = value.raw_text().trim().to_lowercase();
    let spaced = NON_WORD.replace_all(&lowered, " ");
    WHITESPACE_RUN.replace_all(&spaced, " ").trim().to_string()
}

/// Fuzzy closeness of two values in `[0, 1]` after normalization.
pub fn similarity(a: &FieldValue, b: &FieldValue) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ if a <= b => ratcliff_obershelp(&a, &b),
        _ => ratcliff_obershelp(&b, &a),
    }
}

fn ratcliff_obershelp(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let matches = gestalt_match(&a_chars, &b_chars) as f64;
    (2.0 * matches) / (a_chars.len() + b_chars.len()) as f64
}

fn gestalt_match(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    if let Some((start_a, start_b, length)) = longest_common_substring(a, b) {
        let prefix = gestalt_match(&a[..start_a], &b[..start_b]);
        let suffix = gestalt_match(&a[start_a + length..], &b[start_b + length..]);
        length + prefix + suffix
    } else {
        0
    }
}

/// Longest common run, preferring the earliest start in `a` and then in `b`.
fn longest_common_substring(a: &[char], b: &[char]) -> Option<(usize, usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;
    // run[j + 1] is the length of the common run ending at a[i], b[j]
    let mut previous = vec![0_usize; b.len() + 1];
    let mut current = vec![0_usize; b.len() + 1];
    for (i, a_char) in a.iter().enumerate() {
        for (j, b_char) in b.iter().enumerate() {
            current[j + 1] = if a_char == b_char { previous[j] + 1 } else { 0 };
            let length = current[j + 1];
            if length == 0 {
                continue;
            }
            let (start_a, start_b) = (i + 1 - length, j + 1 - length);
            let better = match best {
                None => true,
                Some((best_a, best_b, best_len)) => {
                    length > best_len
                        || (length == best_len && (start_a, start_b) < (best_a, best_b))
                }
            };
            if better {
                best = Some((start_a, start_b, length));
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }
    best
}

/// Reads a value as a number, tolerating thousands separators, accounting
/// parentheses and percentages. Returns `None` rather than failing.
pub fn parse_number(value: &FieldValue) -> Option<f64> {
    let text = match value {
        FieldValue::Number(n) => return n.as_f64(),
        FieldValue::Null => return None,
        FieldValue::Text(s) => s.trim(),
    };
    if text.is_empty() {
        return None;
    }
    let signed = text.replace(',', "").replace('(', "-").replace(')', "");
    let cleaned = NON_NUMERIC.replace_all(&signed, "");
    let (digits, is_percent) = match cleaned.strip_suffix('%') {
        Some(stripped) => (stripped, true),
        None => (cleaned.as_ref(), false),
    };
    let parsed: f64 = digits.parse().ok()?;
    Some(if is_percent { parsed / 100.0 } else { parsed })
}
