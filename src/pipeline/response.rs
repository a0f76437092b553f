//! Response decoding: recognizer text → [`RawRecord`]s.
//!
//! Vision models are asked for a bare JSON array, but in practice they also
//! answer with:
//!
//! - the array wrapped in ` ```json … ``` ` fences
//! - a sentence of prose before or after the array
//! - the structured-output shape
//!   `{"patterns": [{"name", "grid_width", "instruments": [{"instrument_id", "hits"}]}]}`
//!
//! All of these decode to the same records. Anything else is an
//! [`ResponseError`], which the driver records as the page's error marker.
//! Individual rows that are not strings are stringified and left for the
//! normalizer to repair. Within a record, fields of the wrong type fall back
//! to empty values; a record that is not an object at all is skipped. One
//! bad record never costs the page its other records.

use crate::model::RawRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());
static RE_JSON_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());

/// Why a response could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("no JSON array found in response: {0}")]
    NoJson(String),
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Read one record in either of the two accepted wire shapes.
///
/// `None` only when `item` is not an object.
fn record_from_value(item: Value) -> Option<RawRecord> {
    let Value::Object(mut obj) = item else {
        return None;
    };

    let name = match obj.remove("name") {
        Some(Value::String(name)) => name,
        _ => String::new(),
    };
    let grid_width = obj.get("grid_width").map_or(0, width_from_value);

    let mut steps: BTreeMap<String, String> = match obj.remove("steps") {
        Some(Value::Object(rows)) => rows
            .into_iter()
            .map(|(label, row)| (label, value_to_row(row)))
            .collect(),
        _ => BTreeMap::new(),
    };
    if let Some(Value::Array(instruments)) = obj.remove("instruments") {
        for inst in instruments {
            if let Value::Object(mut inst) = inst {
                if let Some((label, row)) = instrument_row(&mut inst) {
                    steps.insert(label, row);
                }
            }
        }
    }

    Some(RawRecord {
        name,
        grid_width,
        steps,
    })
}

/// `{"instrument_id": "BD", "hits": …}` → `("BD", row)`.
fn instrument_row(inst: &mut Map<String, Value>) -> Option<(String, String)> {
    let Some(Value::String(label)) = inst.remove("instrument_id") else {
        return None;
    };
    let row = inst.remove("hits").map_or_else(String::new, value_to_row);
    Some((label, row))
}

/// Integers, integral floats and numeric strings; anything else is 0, which
/// the normalizer rejects.
fn width_from_value(v: &Value) -> u32 {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|w| u32::try_from(w).ok())
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn value_to_row(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Decode a recognizer answer into raw records.
pub fn decode_response(text: &str) -> Result<Vec<RawRecord>, ResponseError> {
    let body = strip_fences(text.trim());

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let Some(m) = RE_JSON_ARRAY.find(body) else {
                return Err(ResponseError::NoJson(excerpt(body)));
            };
            serde_json::from_str(m.as_str())
                .map_err(|e| ResponseError::InvalidJson(e.to_string()))?
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("patterns") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ResponseError::UnexpectedShape(
                    "object without a \"patterns\" array".into(),
                ))
            }
        },
        other => {
            return Err(ResponseError::UnexpectedShape(format!(
                "expected array, got {}",
                type_name(&other)
            )))
        }
    };

    let total = items.len();
    let records: Vec<RawRecord> = items.into_iter().filter_map(record_from_value).collect();
    if records.len() < total {
        warn!(
            "Skipped {} response item(s) that were not objects",
            total - records.len()
        );
    }
    Ok(records)
}

fn strip_fences(input: &str) -> &str {
    RE_OUTER_FENCES
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map_or(input, |m| m.as_str())
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// First 200 characters, for error markers.
fn excerpt(s: &str) -> String {
    let mut out: String = s.chars().take(200).collect();
    if out.len() < s.len() {
        out.push('…');
    }
    out
}
