use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::core::model::PluginRecord;
use crate::downloader::FetchError;

static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();

/// Drop commas that directly precede a closing `}` or `]`.
///
/// Purely textual: a string literal containing `,]` is rewritten too.
pub fn strip_trailing_commas(text: &str) -> Cow<'_, str> {
    TRAILING_COMMA
        .get_or_init(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern compiles"))
        .replace_all(text, "$1")
}

/// Strict parse, then one retry with trailing commas removed.
pub fn parse_lenient(text: &str) -> Result<Value, FetchError> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(error = %first, "JSON parse failed, retrying without trailing commas");
            let repaired = strip_trailing_commas(text);
            let value = serde_json::from_str(&repaired)?;
            debug!("trailing-comma repair succeeded");
            Ok(value)
        }
    }
}

/// Parse a metadata body into records: an object becomes a one-element
/// list and the objects of an array pass through in order.
///
/// Stray non-object array entries are skipped, as on catalog load. An array
/// with entries but no objects at all is rejected, like a scalar body.
pub fn parse_records(text: &str) -> Result<Vec<PluginRecord>, FetchError> {
    match parse_lenient(text)? {
        Value::Object(map) => Ok(vec![map.into()]),
        Value::Array(items) => {
            let total = items.len();
            let first_kind = items.first().map(kind);
            let records: Vec<PluginRecord> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map.into()),
                    _ => None,
                })
                .collect();
            match first_kind {
                Some(k) if records.is_empty() => Err(FetchError::UnexpectedShape(k)),
                _ => {
                    if records.len() != total {
                        warn!(skipped = total - records.len(), "ignored non-object entries in source");
                    }
                    Ok(records)
                }
            }
        }
        other => Err(FetchError::UnexpectedShape(kind(&other))),
    }
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
