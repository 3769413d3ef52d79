use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Conversation turn role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn heading(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single normalized message, as it enters the graph builder.
///
/// Produced by [`crate::normalize`] from whatever the export file contained;
/// nothing downstream of the normalizer sees untyped data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Ingest-order hint, only consulted to break timestamp ties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u64>,
}

impl MessageRecord {
    pub fn new(
        id: impl Into<String>,
        parent_id: Option<&str>,
        role: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_owned),
            role,
            content: content.into(),
            timestamp,
            sequence_index: None,
        }
    }

    pub fn with_sequence_index(mut self, sequence_index: u64) -> Self {
        self.sequence_index = Some(sequence_index);
        self
    }

    /// Canonical sibling order: `timestamp`, then `sequence_index`, then `id`.
    ///
    /// A missing `sequence_index` sorts before any present one.
    pub fn sibling_order(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.sequence_index.cmp(&other.sequence_index))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A message placed in the rebuilt tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageNode {
    #[serde(flatten)]
    pub record: MessageRecord,
    /// Child ids in canonical sibling order.
    pub children: Vec<String>,
    pub branch_id: String,
    /// Edge count from the root.
    pub depth: usize,
    pub is_active: bool,
}

impl MessageNode {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_record(id: &str, parent_id: Option<&str>, ts: i64) -> MessageRecord {
    let timestamp = DateTime::from_timestamp(ts, 0).expect("timestamp in range");
    let role = if parent_id.is_none() {
        Role::User
    } else {
        Role::Assistant
    };
    MessageRecord::new(id, parent_id, role, format!("message {id}"), timestamp)
}
