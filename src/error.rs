use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structural problems that stop a tree from being built.
///
/// Every variant is deterministic for a given message set: retrying the same
/// input reproduces the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("message {id} references missing parent {parent_id}")]
    MissingParent { id: String, parent_id: String },
    #[error("duplicate message id {id}")]
    DuplicateId { id: String },
    #[error("no root message found (every message has a parent)")]
    NoRoot,
    #[error("multiple root messages found: {}", ids.join(", "))]
    MultipleRoots { ids: Vec<String> },
    #[error("parent cycle detected: {}", ids.join(" -> "))]
    Cycle { ids: Vec<String> },
}

impl StructuralError {
    /// Ids named by the error, for relaying to the user verbatim.
    pub fn offending_ids(&self) -> Vec<&str> {
        match self {
            StructuralError::MissingParent { id, parent_id } => {
                vec![id.as_str(), parent_id.as_str()]
            }
            StructuralError::DuplicateId { id } => vec![id.as_str()],
            StructuralError::NoRoot => Vec::new(),
            StructuralError::MultipleRoots { ids } | StructuralError::Cycle { ids } => {
                ids.iter().map(String::as_str).collect()
            }
        }
    }
}

/// Recoverable problems reported by tolerant builds.
///
/// Warnings travel beside the tree, never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// Extra copies of `id` were dropped.
    DuplicateId { id: String, dropped: usize },
    MissingParent { id: String, parent_id: String },
    /// Dropped because an ancestor was dropped.
    Orphaned { id: String, dropped_ancestor: String },
    DiscardedRoot {
        id: String,
        kept_root: String,
        dropped_messages: usize,
    },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::DuplicateId { id, dropped } => {
                write!(f, "dropped {dropped} duplicate copies of message {id}")
            }
            BuildWarning::MissingParent { id, parent_id } => {
                write!(f, "dropped message {id}: parent {parent_id} not found")
            }
            BuildWarning::Orphaned {
                id,
                dropped_ancestor,
            } => write!(
                f,
                "dropped message {id}: ancestor {dropped_ancestor} was dropped"
            ),
            BuildWarning::DiscardedRoot {
                id,
                kept_root,
                dropped_messages,
            } => write!(
                f,
                "discarded root {id} ({dropped_messages} messages), kept root {kept_root}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_names_every_id() {
        let err = StructuralError::MultipleRoots {
            ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "multiple root messages found: a, b");
        assert_eq!(err.offending_ids(), ["a", "b"]);

        let err = StructuralError::MissingParent {
            id: "7".into(),
            parent_id: "ghost".into(),
        };
        assert_eq!(err.to_string(), "message 7 references missing parent ghost");
        assert_eq!(err.offending_ids(), ["7", "ghost"]);
    }

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let warning = BuildWarning::DiscardedRoot {
            id: "r2".into(),
            kept_root: "r1".into(),
            dropped_messages: 3,
        };
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["kind"], "discarded_root");
        assert_eq!(value["id"], "r2");
        assert_eq!(
            warning.to_string(),
            "discarded root r2 (3 messages), kept root r1"
        );
    }
}
