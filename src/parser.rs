//! Turns raw feed bodies into [`AlertRecord`]s
//!
//! The upstream body is UTF-8 JSON, sometimes prefixed with a byte order mark
//! and padded with NUL characters or whitespace while no alert is active.
//! Missing fields fall back to defaults so a partial alert is still
//! published.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::trace;

use crate::AlertRecord;
use crate::error::ParseError;

pub const DEFAULT_CATEGORY: &str = "unknown-category";
pub const DEFAULT_TEXT: &str = "unknown";
pub const GENERATED_ID_PREFIX: &str = "generated-";

/// Bodies shorter than this carry no alert
const MIN_BODY_LEN: usize = 5;

/// Characters of the body kept in a [`ParseError::Malformed`]
const PREFIX_LEN: usize = 100;

const BOM: char = '\u{feff}';

static GENERATED_IDS: AtomicU64 = AtomicU64::new(0);

pub fn parse_alert(raw: &[u8]) -> Result<AlertRecord, ParseError> {
    let text = clean(raw);

    if text.chars().count() < MIN_BODY_LEN {
        return Err(ParseError::Blank);
    }

    let fields: Map<String, Value> =
        serde_json::from_str(&text).map_err(|e| ParseError::Malformed {
            reason: e.to_string(),
            prefix: text.chars().take(PREFIX_LEN).collect(),
        })?;

    let record = AlertRecord {
        id: text_field(&fields, "id").unwrap_or_else(generate_id),
        category: text_field(&fields, "cat").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        title: text_field(&fields, "title").unwrap_or_else(|| DEFAULT_TEXT.to_string()),
        regions: regions(&fields),
        description: text_field(&fields, "desc").unwrap_or_else(|| DEFAULT_TEXT.to_string()),
        raw_payload: text,
    };
    trace!("parsed alert {}", record.id);

    Ok(record)
}

/// Decode, drop the BOM and NULs, trim
fn clean(raw: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let decoded = decoded.strip_prefix(BOM).unwrap_or(&*decoded);

    decoded
        .chars()
        .filter(|c| *c != '\0')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Strings are taken as is, numbers are rendered, anything else is absent
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn regions(fields: &Map<String, Value>) -> Vec<String> {
    match fields.get("data") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn generate_id() -> String {
    let sequence = GENERATED_IDS.fetch_add(1, Ordering::Relaxed);
    let millis = Utc::now().timestamp_millis();
    format!("{GENERATED_ID_PREFIX}{millis}-{sequence}")
}
