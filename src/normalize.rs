//! Converts loosely typed [`RawMessage`]s into canonical [`MessageRecord`]s.
use crate::importer::{CLAUDE_ROOT_SENTINEL, RawMessage};
use crate::model::{MessageRecord, Role};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("message #{position} has no id")]
    MissingId { position: usize },
    #[error("message {id} has no role")]
    MissingRole { id: String },
    #[error("message {id} has unknown role {role:?}")]
    InvalidRole { id: String, role: String },
    #[error("message {id} has no timestamp")]
    MissingTimestamp { id: String },
    #[error("message {id} has unparseable timestamp {value}")]
    InvalidTimestamp { id: String, value: String },
}

pub fn normalize_messages(raw: &[RawMessage]) -> Result<Vec<MessageRecord>, IngestError> {
    raw.iter()
        .enumerate()
        .map(|(position, message)| normalize_message(position, message))
        .collect()
}

pub fn normalize_message(position: usize, raw: &RawMessage) -> Result<MessageRecord, IngestError> {
    let id = non_empty(&raw.id)
        .or(non_empty(&raw.uuid))
        .ok_or(IngestError::MissingId { position })?
        .to_string();

    let parent_id = non_empty(&raw.parent_id)
        .or(non_empty(&raw.parent_message_uuid))
        .filter(|p| *p != CLAUDE_ROOT_SENTINEL)
        .map(str::to_owned);

    let role_text = raw
        .role
        .as_deref()
        .or(raw.sender.as_deref())
        .ok_or_else(|| IngestError::MissingRole { id: id.clone() })?;
    let role = parse_role(role_text).ok_or_else(|| IngestError::InvalidRole {
        id: id.clone(),
        role: role_text.to_string(),
    })?;

    let content = match raw.text.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => raw.content.as_ref().map(flatten_content).unwrap_or_default(),
    };

    let ts_value = raw
        .timestamp
        .as_ref()
        .or(raw.created_at.as_ref())
        .filter(|v| !v.is_null())
        .ok_or_else(|| IngestError::MissingTimestamp { id: id.clone() })?;
    let timestamp = parse_timestamp(ts_value).ok_or_else(|| IngestError::InvalidTimestamp {
        id: id.clone(),
        value: ts_value.to_string(),
    })?;

    Ok(MessageRecord {
        id,
        parent_id,
        role,
        content,
        timestamp,
        sequence_index: raw.sequence_index.or(raw.index),
    })
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.trim().is_empty())
}

fn parse_role(role: &str) -> Option<Role> {
    match role.trim().to_ascii_lowercase().as_str() {
        "user" | "human" => Some(Role::User),
        "assistant" | "ai" | "model" => Some(Role::Assistant),
        "system" => Some(Role::System),
        _ => None,
    }
}

/// RFC 3339 text, a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` read as UTC, or Unix seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Some(ts.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                    return Some(naive.and_utc());
                }
            }
            text.parse::<f64>().ok().and_then(from_unix_seconds)
        }
        Value::Number(number) => match number.as_i64() {
            Some(secs) => DateTime::from_timestamp(secs, 0),
            None => number.as_f64().and_then(from_unix_seconds),
        },
        _ => None,
    }
}

fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Joins the text of content blocks with blank lines; non-text blocks are skipped.
fn flatten_content(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(block_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Object(_) => block_text(value).unwrap_or_default(),
        other => other.to_string(),
    }
}

fn block_text(block: &Value) -> Option<String> {
    match block {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}
