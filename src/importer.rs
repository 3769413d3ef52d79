//! Self-contained type definitions for chat export files.
//!
//! Two shapes are accepted:
//!
//! - the Claude.ai account export (`conversations.json`): an array of
//!   conversations, each carrying `uuid`, `name` and `chat_messages`, where
//!   messages use `uuid`, `parent_message_uuid`, `sender`, `text`/`content`
//!   and `created_at`;
//! - the canonical shape used by this crate: `id`, `parent_id`, `role`,
//!   `content`, `timestamp` and optional `sequence_index`.
//!
//! A file may also hold a single conversation object instead of an array.
//!
//! Fields are `Option`s and raw JSON values; [`crate::normalize`] turns them
//! into typed records.
use crate::normalize::parse_timestamp;
use chrono::{DateTime, Utc};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Claude.ai marks the first message of a conversation with this parent.
pub const CLAUDE_ROOT_SENTINEL: &str = "00000000-0000-4000-8000-000000000000";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A message exactly as the export file spells it.
///
/// Exports may carry two spellings at once (`text` next to `content`), so
/// alternatives are separate fields rather than serde aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Claude.ai spelling of `role` (`human` / `assistant`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Flattened text, when the exporter provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Either a plain string or an array of typed content blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// RFC 3339 string or Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// A conversation exactly as the export file spells it.
///
/// Like [`RawMessage`], each spelling is its own field so files carrying both
/// `uuid` and `id` still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// RFC 3339 string or Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<RawMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat_messages: Vec<RawMessage>,
}

impl RawConversation {
    pub fn id(&self) -> &str {
        first_non_blank(&self.id, &self.uuid).unwrap_or("unknown")
    }

    pub fn title(&self) -> &str {
        first_non_blank(&self.name, &self.title).unwrap_or("Untitled")
    }

    pub fn messages(&self) -> &[RawMessage] {
        if self.messages.is_empty() {
            &self.chat_messages
        } else {
            &self.messages
        }
    }

    /// `None` when absent or unparseable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_ref().and_then(parse_timestamp)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.as_ref().and_then(parse_timestamp)
    }
}

fn first_non_blank<'a>(a: &'a Option<String>, b: &'a Option<String>) -> Option<&'a str> {
    let usable = |s: &&str| !s.trim().is_empty();
    a.as_deref().filter(usable).or(b.as_deref().filter(usable))
}

/// Which conversations of an export to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Id(String),
    Index(usize),
}

/// Read an export file holding either an array of conversations or one conversation.
pub fn load_export(path: &Path) -> Result<Vec<RawConversation>> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read export file: {}", path.display()))?;
    parse_export(&text).wrap_err_with(|| format!("Invalid export file: {}", path.display()))
}

pub fn parse_export(text: &str) -> Result<Vec<RawConversation>> {
    let value: Value = serde_json::from_str(text).wrap_err("Export is not valid JSON")?;
    let is_conversation = matches!(
        &value,
        Value::Object(map) if map.contains_key("messages") || map.contains_key("chat_messages")
    );
    match value {
        Value::Array(_) => {
            serde_json::from_value(value).wrap_err("Failed to decode conversation list")
        }
        Value::Object(_) if is_conversation => {
            let conversation: RawConversation =
                serde_json::from_value(value).wrap_err("Failed to decode conversation")?;
            Ok(vec![conversation])
        }
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().take(5).map(String::as_str).collect();
            Err(eyre!(
                "Expected a list of conversations or a single conversation with messages.\nFound keys: {}",
                keys.join(", ")
            ))
        }
        other => Err(eyre!(
            "Expected a JSON array or object, got {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn select(
    conversations: Vec<RawConversation>,
    selection: &Selection,
) -> Result<Vec<RawConversation>> {
    match selection {
        Selection::All => Ok(conversations),
        Selection::Index(index) => {
            let total = conversations.len();
            conversations
                .into_iter()
                .nth(*index)
                .map(|c| vec![c])
                .ok_or_else(|| {
                    eyre!(
                        "Index {} out of range. Export has {} conversations.",
                        index,
                        total
                    )
                })
        }
        Selection::Id(id) => {
            let total = conversations.len();
            conversations
                .into_iter()
                .find(|c| c.id() == id.as_str())
                .map(|c| vec![c])
                .ok_or_else(|| {
                    eyre!(
                        "Conversation '{}' not found in export ({} conversations).\nUse --list to see them.",
                        id,
                        total
                    )
                })
        }
    }
}

/// One line per conversation, for `--list`.
pub fn list_conversations(conversations: &[RawConversation], limit: usize) -> String {
    let mut out = format!("Found {} conversations.\n", conversations.len());
    for (i, conv) in conversations.iter().take(limit).enumerate() {
        let updated = conv
            .updated_at()
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        out.push_str(&format!(
            "[{}] {}  {}  {} messages  {}\n",
            i,
            updated,
            conv.id(),
            conv.messages().len(),
            conv.title()
        ));
    }
    if conversations.len() > limit {
        out.push_str(&format!(
            "... and {} more.\n",
            conversations.len() - limit
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLAUDE_EXPORT: &str = r#"[
        {
            "uuid": "conv-1",
            "name": "Rust lifetimes",
            "created_at": "2024-11-14T10:00:00.000000Z",
            "updated_at": "2024-11-14T10:05:00.000000Z",
            "chat_messages": [
                {
                    "uuid": "m1",
                    "parent_message_uuid": "00000000-0000-4000-8000-000000000000",
                    "sender": "human",
                    "text": "What is 'a?",
                    "content": [{"type": "text", "text": "What is 'a?"}],
                    "created_at": "2024-11-14T10:00:00.000000Z",
                    "index": 0
                }
            ]
        },
        {"uuid": "conv-2", "name": "", "chat_messages": []}
    ]"#;

    #[test]
    fn parses_batch_export() {
        let conversations = parse_export(CLAUDE_EXPORT).unwrap();
        assert_eq!(conversations.len(), 2);

        let first = &conversations[0];
        assert_eq!(first.id(), "conv-1");
        assert_eq!(first.title(), "Rust lifetimes");
        assert_eq!(first.messages().len(), 1);
        assert_eq!(first.messages()[0].sender.as_deref(), Some("human"));
        assert_eq!(first.messages()[0].index, Some(0));
        assert_eq!(conversations[1].title(), "Untitled");
    }

    #[test]
    fn wraps_single_conversation() {
        let single = r#"{"id": "solo", "messages": [{"id": "1", "role": "user", "content": "hi", "timestamp": 0}]}"#;
        let conversations = parse_export(single).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id(), "solo");
    }

    #[test]
    fn tolerates_both_spellings_and_numeric_times() {
        let both = r#"[{
            "id": "", "uuid": "conv-9",
            "name": "Named", "title": "Titled",
            "created_at": 1731578400, "updated_at": "2024-11-14T10:05:00Z",
            "messages": [], "chat_messages": [{"uuid": "m1"}]
        }]"#;
        let conv = parse_export(both).unwrap().remove(0);

        assert_eq!(conv.id(), "conv-9");
        assert_eq!(conv.title(), "Named");
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.created_at().map(|t| t.timestamp()), Some(1_731_578_400));
        assert_eq!(conv.updated_at().map(|t| t.timestamp()), Some(1_731_578_700));
    }

    #[test]
    fn rejects_objects_without_messages() {
        let err = parse_export(r#"{"users": []}"#).unwrap_err();
        assert!(err.to_string().contains("Found keys: users"));

        let err = parse_export("42").unwrap_err();
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn selects_by_id_and_index() {
        let conversations = parse_export(CLAUDE_EXPORT).unwrap();

        let by_id = select(conversations.clone(), &Selection::Id("conv-2".into())).unwrap();
        assert_eq!(by_id[0].id(), "conv-2");

        let by_index = select(conversations.clone(), &Selection::Index(0)).unwrap();
        assert_eq!(by_index[0].id(), "conv-1");

        assert!(select(conversations.clone(), &Selection::Index(5)).is_err());
        assert!(select(conversations.clone(), &Selection::Id("nope".into())).is_err());
        assert_eq!(select(conversations, &Selection::All).unwrap().len(), 2);
    }

    #[test]
    fn listing_truncates_at_limit() {
        let conversations = parse_export(CLAUDE_EXPORT).unwrap();
        let listing = list_conversations(&conversations, 1);
        assert!(listing.starts_with("Found 2 conversations."));
        assert!(listing.contains("[0] 2024-11-14  conv-1  1 messages  Rust lifetimes"));
        assert!(listing.contains("... and 1 more."));
    }
}
