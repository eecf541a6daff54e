//! Value filtering over flattened records.
//!
//! A record survives when every filter token is a case-insensitive substring
//! of at least one scalar value or one dotted path of that record.

use serde_json::Value;

use crate::flatten::Record;

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.to_ascii_lowercase()),
        other => Some(other.to_string().to_ascii_lowercase()),
    }
}

/// Returns true when every token matches somewhere in the record.
pub fn record_matches(record: &Record, tokens: &[String]) -> bool {
    tokens.iter().all(|token| {
        let needle = token.to_ascii_lowercase();
        record.iter().any(|(path, value)| {
            path.to_ascii_lowercase().contains(&needle)
                || scalar_text(value).is_some_and(|text| text.contains(&needle))
        })
    })
}

/// Keeps the records matching all filter tokens, preserving order.
pub fn filter_records(records: Vec<Record>, tokens: &[String]) -> Vec<Record> {
    if tokens.is_empty() {
        return records;
    }
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| record_matches(record, tokens))
        .collect();
    tracing::debug!(kept = kept.len(), filters = ?tokens, "value filters applied");
    kept
}
