use crate::graph::MessageGraph;
use crate::model::MessageRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Decides which child carries its parent's branch past a fork.
///
/// The upstream service never says which reply "continues" a conversation, so
/// the choice is pluggable. The branch labeler and the active path selector
/// both consult the same policy, keeping the active thread and the continuing
/// branch in agreement.
pub trait ContinuationPolicy: fmt::Debug + Send + Sync {
    /// Returns the position in `siblings` of the continuing child.
    ///
    /// `siblings` is non-empty and in canonical sibling order
    /// (see [`MessageRecord::sibling_order`]).
    fn continuation(&self, siblings: &[&MessageRecord]) -> usize;
}

/// Latest timestamp continues; ties go to the higher `sequence_index`, then the larger id.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestChild;

impl ContinuationPolicy for LatestChild {
    fn continuation(&self, siblings: &[&MessageRecord]) -> usize {
        siblings
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.sibling_order(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// The first reply continues and later regenerations fork off it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EarliestChild;

impl ContinuationPolicy for EarliestChild {
    fn continuation(&self, siblings: &[&MessageRecord]) -> usize {
        siblings
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.sibling_order(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Built-in policies, selectable from the CLI and config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Latest,
    Earliest,
}

impl PolicyKind {
    pub fn policy(self) -> Arc<dyn ContinuationPolicy> {
        match self {
            PolicyKind::Latest => Arc::new(LatestChild),
            PolicyKind::Earliest => Arc::new(EarliestChild),
        }
    }
}

/// The child of `node` that continues its branch, or `None` at a leaf.
pub fn continuing_child(
    policy: &dyn ContinuationPolicy,
    graph: &MessageGraph,
    node: usize,
) -> Option<usize> {
    let children = graph.children(node);
    match children {
        [] => None,
        [only] => Some(*only),
        _ => {
            let siblings: Vec<&MessageRecord> =
                children.iter().map(|&c| graph.record(c)).collect();
            let pick = policy.continuation(&siblings).min(children.len() - 1);
            Some(children[pick])
        }
    }
}
