//! Pull a JSON object out of an oracle's free-text reply.
//!
//! Models wrap JSON in markdown fences, prepend chatter, or append a closing
//! remark. The strategy is the same for both oracles:
//!
//! 1. the first fenced code block (```json … ``` or bare ``` … ```),
//! 2. otherwise the whole reply,
//! 3. otherwise the outermost `{ … }` span,
//!
//! and the first candidate that parses as a JSON object wins.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap());

/// Find the first JSON object in `reply`.
pub fn extract_json_object(reply: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut saw_json = false;
    let mut last_error = None;
    for candidate in candidates(trimmed) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => saw_json = true,
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    if saw_json {
        Err(ParseError::NotAnObject)
    } else {
        Err(ParseError::Invalid {
            detail: last_error.unwrap_or_else(|| "no JSON found".to_string()),
        })
    }
}

/// Find the first JSON object in `reply` and deserialize it as `T`.
pub fn parse_structured_reply<T: DeserializeOwned>(reply: &str) -> Result<T, ParseError> {
    let object = extract_json_object(reply)?;
    serde_json::from_value(Value::Object(object)).map_err(|e| ParseError::Invalid {
        detail: e.to_string(),
    })
}

fn candidates(reply: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(3);
    if let Some(block) = RE_FENCED.captures(reply).and_then(|c| c.get(1)) {
        out.push(block.as_str().trim());
    }
    out.push(reply);
    if let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) {
        if start < end {
            out.push(&reply[start..=end]);
        }
    }
    out
}
