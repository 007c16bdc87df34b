//! Safe extraction of numbers, strings and dates from loosely typed raw fields.
//!
//! Upstream records come from several exporters, so the same logical field
//! may be a JSON number, a numeric string (`"1234,5"`, `"45%"`), a
//! BigQuery-style wrapper (`{"value": "2024-03-01"}`) or missing entirely.
//! Nothing here fails: a value that cannot be read is reported as `None` and
//! the caller substitutes the field default.

use serde_json::{Map, Value};

pub type RawFields = Map<String, Value>;

/// Unwraps `{"value": x}` objects produced by some warehouse exports.
fn unwrap_value(value: &Value) -> &Value {
    match value {
        Value::Object(map) => map.get("value").unwrap_or(value),
        _ => value,
    }
}

pub fn coerce_number(value: &Value) -> Option<f64> {
    match unwrap_value(value) {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

fn parse_numeric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = trimmed.parse::<f64>().ok().or_else(|| {
        // "1234,56" style decimal comma; strings mixing both separators are rejected
        if trimmed.contains(',') && !trimmed.contains('.') {
            trimmed.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    })?;

    parsed.is_finite().then_some(parsed)
}

pub fn coerce_integer(value: &Value) -> Option<i64> {
    coerce_number(value).map(|v| v.round() as i64)
}

/// Non-blank text. Numbers and booleans are rendered with their JSON text.
pub fn coerce_string(value: &Value) -> Option<String> {
    let text = match unwrap_value(value) {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Splits a delimited list field (`"Sem atividade; Preço"`) or reads a JSON
/// array of strings. Blank items are dropped.
pub fn coerce_string_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match unwrap_value(value) {
        Value::Array(items) => items.iter().filter_map(coerce_string).collect(),
        Value::String(s) => s
            .split([';', ',', '|', '\n'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    (!items.is_empty()).then_some(items)
}

/// First synonym key whose value coerces successfully wins.
pub fn first_match<T>(
    raw: &RawFields,
    keys: &[&str],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(|value| coerce(value))
}

pub fn first_number(raw: &RawFields, keys: &[&str]) -> Option<f64> {
    first_match(raw, keys, coerce_number)
}

pub fn first_string(raw: &RawFields, keys: &[&str]) -> Option<String> {
    first_match(raw, keys, coerce_string)
}

/// Converts a raw confidence of unknown shape into a 0..=100 percentage.
///
/// - missing, non-numeric or non-finite → `0`
/// - `0 < v <= 1` → read as a fraction, `round(v * 100)`
/// - anything else → read as a percentage, `round(v)`
///
/// The result is clamped to `0..=100`, so a negative input becomes `0`
/// rather than `round(v)`.
///
/// Known limitation: an input of exactly `1` cannot be told apart from "1%";
/// it is read as a fraction and becomes `100`. Re-applying the rule to an
/// output above 1 leaves it unchanged, but an output of exactly 1 (from an
/// input in `[0.5, 1.5)` read as a percentage) would jump to 100 on a second
/// pass.
pub fn normalize_confidence(raw: Option<&Value>) -> f64 {
    match raw.and_then(coerce_number) {
        Some(v) => normalize_confidence_value(v),
        None => 0.0,
    }
}

pub fn normalize_confidence_value(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    let percentage = if v > 0.0 && v <= 1.0 {
        (v * 100.0).round()
    } else {
        v.round()
    };
    percentage.clamp(0.0, 100.0)
}
