//! # chat-tree-export
//!
//! Rebuilds branching chat conversations from flat message exports and writes
//! them out as JSON trees and Markdown transcripts.
//!
//! ## What it does
//!
//! Chat exports store every message ever sent, including the ones abandoned
//! when a prompt was edited or a reply regenerated. Each message only knows its
//! parent. This crate reassembles that flat list into a tree, names every
//! branch, picks the thread the user actually continued, and reports metrics
//! about the shape of the conversation.
//!
//! The tree engine ([`build_tree`]) is pure: the same set of messages always
//! yields the same tree, whatever order the export lists them in.
//!
//! ## Strict and tolerant builds
//!
//! By default, a duplicate id, a dangling parent reference, a cycle or a
//! second root fails the conversation with a [`StructuralError`]. With
//! [`BuildOptions::tolerant`], duplicates, dangling subtrees and extra roots
//! are dropped instead and reported as [`BuildWarning`]s next to the tree.
//!
//! ## Incremental export
//!
//! On repeated runs, each conversation's `updated_at` is compared with the one
//! recorded in its previous export. Unchanged conversations are skipped.
//!
//! ## Usage
//!
//! ```sh
//! # Export every conversation of a Claude.ai account export
//! chat-tree-export conversations.json ~/notes/chats
//!
//! # One conversation, active thread only, with tags for Obsidian
//! chat-tree-export conversations.json ~/notes/chats --index 3 --branches active --tags chat,llm
//! ```
//!
//! Preferences can be persisted in `~/.config/chat-tree-export/config.toml`.

pub mod active;
pub mod branch;
pub mod error;
pub mod exporter;
pub mod graph;
pub mod importer;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod parallel;
pub mod policy;
pub mod process;
#[cfg(feature = "sequential")]
pub mod sequential;
pub mod tree;
pub mod utils;

pub use error::{BuildWarning, StructuralError};
pub use metrics::TreeMetrics;
pub use model::{MessageNode, MessageRecord, Role};
pub use policy::{ContinuationPolicy, EarliestChild, LatestChild, PolicyKind};
pub use tree::{BuildOptions, BuildOutcome, ConversationTree, build_tree};
