//! Response Normalizer
//!
//! The analysis webhook has answered in several incompatible shapes over
//! time. Each is detected up front, most specific first, and unwrapped to a
//! single canonical object:
//!
//! ```text
//! [{"content": {"parts": [{"text": "```json\n{...}\n```"}]}}]   LLM wrapper
//! [{...}]                                                     array of one
//! {...}                                                       direct
//! ```
//!
//! The canonical object carries the error list under
//! `errorsAndCorrections` or `errors_and_corrections`, and optionally
//! `image_dimensions`.

use serde_json::{Map, Value};

use super::coordinates::coerce_number;
use super::types::{AnalysisError, ImageDimensions, NormalizedResponse, RawErrorRecord};

const ERROR_LIST_FIELDS: &[&str] = &["errorsAndCorrections", "errors_and_corrections"];
const DIMENSION_FIELDS: &[&str] = &["image_dimensions", "imageDimensions"];

const ERROR_TYPE_FIELDS: &[&str] = &["error_type", "errorType"];
const FOUND_TEXT_FIELDS: &[&str] = &["found_text", "foundText", "original_text"];
const CORRECTED_TEXT_FIELDS: &[&str] = &["corrected_text", "correctedText", "suggested_correction"];
const DESCRIPTION_FIELDS: &[&str] = &["issue_description", "issueDescription", "description"];
const COORDINATE_FIELDS: &[&str] = &["Coordinates", "coordinates"];

/// Top-level payload shapes, in detection order
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape<'a> {
    /// LLM output: JSON (maybe fenced) inside `[0].content.parts[0].text`
    LlmWrapped(&'a str),
    /// Non-empty array; the first element is the payload
    ArrayWrapped(&'a Value),
    /// The body itself is the payload
    Direct(&'a Value),
}

impl<'a> ResponseShape<'a> {
    pub fn detect(body: &'a Value) -> Self {
        if let Some(text) = llm_text(body) {
            return ResponseShape::LlmWrapped(text);
        }
        match body {
            Value::Array(items) if !items.is_empty() => ResponseShape::ArrayWrapped(&items[0]),
            other => ResponseShape::Direct(other),
        }
    }
}

fn llm_text(body: &Value) -> Option<&str> {
    body.as_array()?
        .first()?
        .pointer("/content/parts/0/text")?
        .as_str()
}

/// Normalize a raw webhook body.
///
/// An `Ok` with an empty error list means "no findings". Payloads that
/// cannot be interpreted at all return [`AnalysisError::ParseFailure`] so the
/// caller can tell them apart from a clean image.
pub fn normalize(body: &Value) -> Result<NormalizedResponse, AnalysisError> {
    match ResponseShape::detect(body) {
        ResponseShape::LlmWrapped(text) => {
            let payload: Value = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
                AnalysisError::ParseFailure(format!("embedded LLM text is not JSON: {}", e))
            })?;
            canonicalize(&payload)
        }
        ResponseShape::ArrayWrapped(first) => canonicalize(first),
        ResponseShape::Direct(value) => canonicalize(value),
    }
}

fn canonicalize(payload: &Value) -> Result<NormalizedResponse, AnalysisError> {
    let map = match payload {
        Value::Object(map) => map,
        Value::Array(items) => {
            return match items.first() {
                None => Ok(NormalizedResponse::default()),
                Some(first @ Value::Object(_)) => canonicalize(first),
                Some(other) => Err(AnalysisError::ParseFailure(format!(
                    "expected an array of objects, found an array of {}",
                    kind(other)
                ))),
            }
        }
        other => {
            return Err(AnalysisError::ParseFailure(format!(
                "expected a JSON object, found {}",
                kind(other)
            )))
        }
    };

    let errors = match first_alias(map, ERROR_LIST_FIELDS) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| {
                let record = raw_record(entry);
                if record.is_none() {
                    tracing::warn!("Skipping error entry that is not an object: {}", kind(entry));
                }
                record
            })
            .collect(),
        Some(other) => {
            return Err(AnalysisError::ParseFailure(format!(
                "error list must be an array, found {}",
                kind(other)
            )))
        }
    };

    let image_dimensions = first_alias(map, DIMENSION_FIELDS).and_then(parse_dimensions);

    Ok(NormalizedResponse {
        errors,
        image_dimensions,
    })
}

fn raw_record(entry: &Value) -> Option<RawErrorRecord> {
    let map = entry.as_object()?;
    Some(RawErrorRecord {
        error_type: text_field(map, ERROR_TYPE_FIELDS),
        found_text: text_field(map, FOUND_TEXT_FIELDS),
        corrected_text: text_field(map, CORRECTED_TEXT_FIELDS),
        issue_description: text_field(map, DESCRIPTION_FIELDS),
        coordinates: first_alias(map, COORDINATE_FIELDS)
            .filter(|v| !v.is_null())
            .cloned(),
    })
}

/// First present value among a field's accepted aliases
fn first_alias<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|name| map.get(*name))
}

fn text_field(map: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    match first_alias(map, aliases)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_dimensions(value: &Value) -> Option<ImageDimensions> {
    let map = value.as_object()?;
    let width = coerce_number(map.get("width")?).round();
    let height = coerce_number(map.get("height")?).round();
    if width >= 1.0 && height >= 1.0 && width <= u32::MAX as f64 && height <= u32::MAX as f64 {
        Some(ImageDimensions::new(width as u32, height as u32))
    } else {
        None
    }
}

/// Strip a surrounding Markdown code fence (```` ``` ```` or ```` ```json ````)
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match rest.split_once('\n') {
        Some((label, body)) if label.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
