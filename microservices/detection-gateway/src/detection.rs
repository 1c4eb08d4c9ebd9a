//! Detection parsing and filtering
//!
//! Roboflow returns loosely shaped JSON. Workflows answer with a list of
//! output objects, hosted models with a single object; both carry a
//! `predictions` list whose entries name the class and a confidence score.

use serde::Serialize;
use serde_json::Value;

/// One class hypothesis returned by the inference backend
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub label: String,
    pub confidence: f64,
}

impl DetectionRecord {
    /// Read a single prediction entry.
    ///
    /// The label comes from `class`, falling back to `label`. The confidence
    /// comes from `confidence`, falling back to `score`, and defaults to 0.
    /// Entries that are not objects or carry no label yield `None`.
    pub fn from_prediction(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let label = ["class", "label"]
            .iter()
            .filter_map(|key| obj.get(*key).and_then(Value::as_str))
            .find(|label| !label.is_empty())?;

        let confidence = ["confidence", "score"]
            .iter()
            .filter_map(|key| obj.get(*key).and_then(Value::as_f64))
            .find(|c| *c != 0.0)
            .unwrap_or(0.0);

        Some(Self {
            label: label.to_string(),
            confidence,
        })
    }
}

/// Matched detection as reported to the device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub label: String,
    /// Percentage, rounded to two decimals
    pub confidence: f64,
}

impl From<&DetectionRecord> for DetectedObject {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            label: record.label.clone(),
            confidence: as_percentage(record.confidence),
        }
    }
}

/// Scale a `[0, 1]` confidence to a percentage with two decimals.
pub fn as_percentage(confidence: f64) -> f64 {
    (confidence * 100.0 * 100.0).round() / 100.0
}

/// Collect the raw prediction entries from an inference result.
pub fn extract_predictions(result: &Value) -> Vec<Value> {
    match result {
        Value::Object(_) => predictions_of(result),
        Value::Array(items) => items.iter().flat_map(predictions_of).collect(),
        _ => Vec::new(),
    }
}

fn predictions_of(item: &Value) -> Vec<Value> {
    match item.get("predictions") {
        Some(Value::Array(list)) => list.clone(),
        // workflow outputs wrap the model response one level deeper
        Some(nested @ Value::Object(_)) => match nested.get("predictions") {
            Some(Value::Array(list)) => list.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Parse every well-formed prediction, skipping malformed entries.
pub fn parse_detections(result: &Value) -> Vec<DetectionRecord> {
    extract_predictions(result)
        .iter()
        .filter_map(DetectionRecord::from_prediction)
        .collect()
}

/// Keep detections whose label equals `target_label` (ignoring case) and whose
/// confidence is at least `threshold`. Input order is preserved.
pub fn filter(
    detections: &[DetectionRecord],
    target_label: &str,
    threshold: f64,
) -> Vec<DetectionRecord> {
    let target = target_label.to_lowercase();
    detections
        .iter()
        .filter(|d| d.label.to_lowercase() == target && d.confidence >= threshold)
        .cloned()
        .collect()
}
