//! Lenient decoding of model JSON output.
//!
//! Models frequently wrap JSON in markdown code fences or surround it with
//! prose even when a JSON format is requested. Decoding is kept separate from
//! prompt construction so parsing can be tested without a backend.

use serde_json::{Map, Value};
use thiserror::Error;

/// Why a model response could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty model response")]
    Empty,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl From<DecodeError> for atelier_core::Error {
    fn from(e: DecodeError) -> Self {
        atelier_core::Error::Inference(e.to_string())
    }
}

/// Remove a surrounding ```` ```json ```` / ```` ``` ```` fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Decode a model response into a JSON object.
///
/// Tries the fence-stripped text first, then the outermost `{...}` span.
pub fn decode_object(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value = match serde_json::from_str::<Value>(text) {
        Ok(v) => v,
        Err(direct_err) => match outer_object_span(text) {
            Some(span) => serde_json::from_str::<Value>(span)
                .map_err(|_| DecodeError::Malformed(direct_err.to_string()))?,
            None => return Err(DecodeError::Malformed(direct_err.to_string())),
        },
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject(kind(&other))),
    }
}

/// Clean a plain-text answer: strip fences, whitespace and quote characters.
pub fn clean_text_answer(raw: &str) -> String {
    strip_code_fence(raw).replace(['\'', '"'], "").trim().to_string()
}

fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
