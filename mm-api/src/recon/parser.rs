//! Provider output normalization
//!
//! `parse_provider_output` is a pure, best-effort classifier over the
//! *shape* of the inference payload rather than a strict schema. The
//! provider versions its output independently of this service: depending on
//! model version the output arrives as an array of parts (sometimes with
//! JSON-encoded string elements) or as a single object, with inconsistent
//! key names. A new model version that adds or renames fields degrades to
//! partial data loss here, never to a request failure.
//!
//! The parser only relocates values; it never invents them. Every field of
//! the canonical result is optional, and absence is distinct from an
//! explicit empty value.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Measurement dimension names the provider is known to emit
///
/// An array element containing any of these is classified as the
/// measurements component.
const MEASUREMENT_KEYS: &[&str] = &[
    "shoulder_width",
    "body_length",
    "chest_width",
    "sleeve_length",
    "waist_width",
    "hem_width",
    "inseam",
    "total_length",
];

/// Keys under which the provider embeds the pixel-per-cm factor
const SCALE_KEYS: &[&str] = &["pixelPerCm", "pixel_per_cm"];

/// Fixed tag for a scale found as a flattened top-level field
const DIRECT_SCALE_TAG: &str = "replicate_direct";

/// Pixel-to-physical-unit conversion factor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceScale {
    /// Always "pixelPerUnit"; kept explicit so stored JSON is self-describing
    pub kind: String,
    pub value: f64,
    /// Which key the factor was found under (landmark point index, or a
    /// fixed tag for flattened/object placements)
    pub source_key: String,
}

impl ReferenceScale {
    pub fn pixel_per_unit(value: f64, source_key: impl Into<String>) -> Self {
        Self {
            kind: "pixelPerUnit".to_string(),
            value,
            source_key: source_key.into(),
        }
    }
}

/// Canonical measurement result, independent of provider payload shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementResult {
    /// Named numeric dimensions, passed through opaquely
    pub measurements: Option<Map<String, Value>>,
    /// Point-index keyed landmark mapping
    pub landmarks: Option<Map<String, Value>>,
    pub reference_scale: Option<ReferenceScale>,
    pub annotated_image_url: Option<String>,
    pub mask_image_url: Option<String>,
}

impl MeasurementResult {
    /// True when there is nothing to reconcile
    ///
    /// Image references alone are not worth a write; the relay collaborator
    /// owns image durability.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_none() && self.landmarks.is_none()
    }
}

/// Normalize a raw provider payload into a canonical result
///
/// Never fails: malformed or unclassifiable input yields a partial or
/// all-absent result, logged at debug level.
pub fn parse_provider_output(raw: &Value) -> MeasurementResult {
    match raw {
        Value::Array(elements) => parse_sequence_form(elements),
        Value::Object(obj) => parse_object_form(obj),
        _ => {
            debug!(shape = raw_shape(raw), "Unrecognized provider output form");
            MeasurementResult::default()
        }
    }
}

fn raw_shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Sequence form
// ----------------------------------------------------------------------------

fn parse_sequence_form(elements: &[Value]) -> MeasurementResult {
    let mut result = MeasurementResult::default();

    for (index, element) in elements.iter().enumerate() {
        // String elements are nested JSON from older model versions
        let parsed;
        let element = match element {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    parsed = value;
                    &parsed
                }
                Err(e) => {
                    debug!(index, error = %e, "Skipping unparseable string element");
                    continue;
                }
            },
            other => other,
        };

        let Value::Object(obj) = element else {
            debug!(index, shape = raw_shape(element), "Skipping non-object element");
            continue;
        };

        if obj.keys().any(|k| MEASUREMENT_KEYS.contains(&k.as_str())) {
            if result.measurements.is_none() {
                result.measurements = Some(obj.clone());
            } else {
                debug!(index, "Duplicate measurements element; keeping the first");
            }
        } else if obj.keys().any(|k| is_point_index(k)) {
            if result.reference_scale.is_none() {
                result.reference_scale = extract_landmark_scale(obj);
            }
            if result.landmarks.is_none() {
                result.landmarks = Some(obj.clone());
            } else {
                debug!(index, "Duplicate landmark element; keeping the first");
            }
        } else if has_named_fields(obj) {
            merge_named_fields(obj, &mut result);
        } else {
            debug!(index, "Unclassifiable element; skipping");
        }
    }

    result
}

fn is_point_index(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// Scan a landmark mapping for an embedded reference scale
///
/// The per-point values are checked first (lowest point index wins); if no
/// point carries it, the mapping itself is checked one level up.
fn extract_landmark_scale(landmarks: &Map<String, Value>) -> Option<ReferenceScale> {
    let mut point_keys: Vec<&String> = landmarks.keys().filter(|k| is_point_index(k)).collect();
    point_keys.sort_by_key(|k| k.parse::<u64>().unwrap_or(u64::MAX));

    for key in point_keys {
        if let Some(point) = landmarks.get(key.as_str()).and_then(Value::as_object) {
            if let Some(value) = scale_value(point) {
                return Some(ReferenceScale::pixel_per_unit(value, key.clone()));
            }
        }
    }

    scale_value(landmarks)
        .map(|value| ReferenceScale::pixel_per_unit(value, scale_key_name(landmarks)))
}

fn scale_value(obj: &Map<String, Value>) -> Option<f64> {
    SCALE_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_f64))
}

fn scale_key_name(obj: &Map<String, Value>) -> String {
    SCALE_KEYS
        .iter()
        .find(|key| obj.contains_key(**key))
        .map(|key| key.to_string())
        .unwrap_or_else(|| DIRECT_SCALE_TAG.to_string())
}

// ----------------------------------------------------------------------------
// Object form (and sequence elements carrying explicit named fields)
// ----------------------------------------------------------------------------

fn has_named_fields(obj: &Map<String, Value>) -> bool {
    [
        "measurements",
        "landmarks",
        "keypoints",
        "reference",
        "reference_object",
        "annotated_image",
        "result_image",
        "mask_image",
        "mask_url",
    ]
    .iter()
    .any(|k| obj.contains_key(*k))
        || scale_value(obj).is_some()
}

fn parse_object_form(obj: &Map<String, Value>) -> MeasurementResult {
    let mut result = MeasurementResult::default();
    merge_named_fields(obj, &mut result);
    if result == MeasurementResult::default() {
        debug!("Object-form output carried no recognizable fields");
    }
    result
}

/// Copy explicitly named fields into the result, filling only unset slots
fn merge_named_fields(obj: &Map<String, Value>, result: &mut MeasurementResult) {
    if result.measurements.is_none() {
        result.measurements = obj.get("measurements").and_then(Value::as_object).cloned();
    }

    if result.landmarks.is_none() {
        result.landmarks = first_of(obj, &["landmarks", "keypoints"])
            .and_then(Value::as_object)
            .cloned();
    }

    if result.reference_scale.is_none() {
        result.reference_scale = extract_named_scale(obj);
    }

    if result.annotated_image_url.is_none() {
        result.annotated_image_url = first_of(obj, &["annotated_image", "result_image"])
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    if result.mask_image_url.is_none() {
        result.mask_image_url = first_of(obj, &["mask_image", "mask_url"])
            .and_then(Value::as_str)
            .map(str::to_string);
    }
}

fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

/// Reference scale from a nested object or a flattened top-level field
fn extract_named_scale(obj: &Map<String, Value>) -> Option<ReferenceScale> {
    for container_key in ["reference", "reference_object"] {
        if let Some(reference) = obj.get(container_key).and_then(Value::as_object) {
            let value = scale_value(reference).or_else(|| {
                reference.get("value").and_then(Value::as_f64)
            });
            if let Some(value) = value {
                return Some(ReferenceScale::pixel_per_unit(value, container_key));
            }
        }
    }

    // Flattened: pixel_per_cm directly on the output object
    scale_value(obj).map(|value| ReferenceScale::pixel_per_unit(value, DIRECT_SCALE_TAG))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn sequence_element_with_measurement_key_is_measurements() {
        let raw = json!([
            { "shoulder_width": 42.0, "body_length": 68.5 }
        ]);

        let result = parse_provider_output(&raw);
        assert_eq!(
            result.measurements,
            Some(as_map(json!({ "shoulder_width": 42.0, "body_length": 68.5 })))
        );
        assert!(result.landmarks.is_none());
    }

    #[test]
    fn measurement_element_is_never_classified_as_landmarks() {
        // shoulder_width present alongside numeric-looking extras
        let raw = json!([
            { "shoulder_width": 42.0, "1": [10, 20] }
        ]);

        let result = parse_provider_output(&raw);
        assert!(result.measurements.is_some());
        assert!(result.landmarks.is_none());
    }

    #[test]
    fn numeric_string_keys_classify_as_landmarks() {
        let raw = json!([
            {
                "1": { "x": 10.0, "y": 20.0 },
                "2": { "x": 30.0, "y": 40.0 }
            }
        ]);

        let result = parse_provider_output(&raw);
        let landmarks = result.landmarks.expect("landmarks");
        assert!(landmarks.contains_key("1"));
        assert!(landmarks.contains_key("2"));
        assert!(result.reference_scale.is_none());
    }

    #[test]
    fn embedded_point_scale_is_extracted_with_point_key() {
        let raw = json!([
            {
                "1": { "x": 10.0, "y": 20.0 },
                "9": { "x": 5.0, "y": 6.0, "pixelPerCm": 15.18 }
            }
        ]);

        let result = parse_provider_output(&raw);
        let scale = result.reference_scale.expect("reference scale");
        assert_eq!(scale.kind, "pixelPerUnit");
        assert_eq!(scale.value, 15.18);
        assert_eq!(scale.source_key, "9");
    }

    #[test]
    fn mapping_level_scale_used_when_no_point_carries_it() {
        let raw = json!([
            {
                "1": { "x": 10.0, "y": 20.0 },
                "pixel_per_cm": 11.4
            }
        ]);

        let result = parse_provider_output(&raw);
        let scale = result.reference_scale.expect("reference scale");
        assert_eq!(scale.value, 11.4);
        assert_eq!(scale.source_key, "pixel_per_cm");
    }

    #[test]
    fn string_elements_are_nested_parsed() {
        let raw = json!([
            "{\"shoulder_width\": 40.0}",
            "{\"1\": {\"x\": 1.0, \"y\": 2.0}}"
        ]);

        let result = parse_provider_output(&raw);
        assert!(result.measurements.is_some());
        assert!(result.landmarks.is_some());
    }

    #[test]
    fn unparseable_string_element_is_skipped_not_fatal() {
        let raw = json!([
            "not json at all",
            { "shoulder_width": 40.0 }
        ]);

        let result = parse_provider_output(&raw);
        assert!(result.measurements.is_some());
    }

    #[test]
    fn unclassifiable_element_is_skipped() {
        let raw = json!([
            { "something_else": true },
            42,
            { "shoulder_width": 40.0 }
        ]);

        let result = parse_provider_output(&raw);
        assert!(result.measurements.is_some());
        assert!(result.landmarks.is_none());
    }

    #[test]
    fn sequence_element_with_named_fields_extracts_directly() {
        let raw = json!([
            {
                "keypoints": { "1": { "x": 1.0, "y": 2.0 } },
                "annotated_image": "https://cdn.example.com/out/annotated.png"
            }
        ]);

        let result = parse_provider_output(&raw);
        assert!(result.landmarks.is_some());
        assert_eq!(
            result.annotated_image_url.as_deref(),
            Some("https://cdn.example.com/out/annotated.png")
        );
    }

    #[test]
    fn object_form_reads_measurements_and_landmarks() {
        let raw = json!({
            "measurements": { "body_length": 70.0 },
            "landmarks": { "1": { "x": 1.0, "y": 2.0 } }
        });

        let result = parse_provider_output(&raw);
        assert!(result.measurements.is_some());
        assert!(result.landmarks.is_some());
    }

    #[test]
    fn object_form_accepts_keypoints_alias() {
        let raw = json!({
            "keypoints": { "1": { "x": 1.0, "y": 2.0 } }
        });

        let result = parse_provider_output(&raw);
        assert!(result.landmarks.is_some());
    }

    #[test]
    fn object_form_flattened_scale_gets_direct_tag() {
        let raw = json!({
            "measurements": { "body_length": 70.0 },
            "pixel_per_cm": 12.5
        });

        let result = parse_provider_output(&raw);
        let scale = result.reference_scale.expect("reference scale");
        assert_eq!(scale.kind, "pixelPerUnit");
        assert_eq!(scale.value, 12.5);
        assert_eq!(scale.source_key, "replicate_direct");
    }

    #[test]
    fn object_form_nested_reference_wins_over_flattened() {
        let raw = json!({
            "measurements": { "body_length": 70.0 },
            "reference": { "pixel_per_cm": 9.9 },
            "pixel_per_cm": 12.5
        });

        let result = parse_provider_output(&raw);
        let scale = result.reference_scale.expect("reference scale");
        assert_eq!(scale.value, 9.9);
        assert_eq!(scale.source_key, "reference");
    }

    #[test]
    fn object_form_image_aliases() {
        let raw = json!({
            "measurements": { "body_length": 70.0 },
            "result_image": "https://cdn.example.com/a.png",
            "mask_url": "https://cdn.example.com/m.png"
        });

        let result = parse_provider_output(&raw);
        assert_eq!(result.annotated_image_url.as_deref(), Some("https://cdn.example.com/a.png"));
        assert_eq!(result.mask_image_url.as_deref(), Some("https://cdn.example.com/m.png"));
    }

    #[test]
    fn unrecognized_form_yields_all_absent() {
        for raw in [json!("plain string"), json!(3.14), json!(null), json!(true)] {
            let result = parse_provider_output(&raw);
            assert_eq!(result, MeasurementResult::default());
            assert!(result.is_empty());
        }
    }

    #[test]
    fn image_refs_alone_still_count_as_empty() {
        let raw = json!({
            "annotated_image": "https://cdn.example.com/a.png"
        });

        let result = parse_provider_output(&raw);
        assert!(result.is_empty());
        assert!(result.annotated_image_url.is_some());
    }
}
