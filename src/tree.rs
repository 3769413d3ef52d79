//! Assembles the self-describing [`ConversationTree`] handed to exporters.
use crate::active::{ActivePath, select_active_path};
use crate::branch::{BranchLabels, label_branches};
use crate::error::{BuildWarning, StructuralError};
use crate::graph::{MessageGraph, build_graph};
use crate::metrics::{TreeMetrics, compute_metrics};
use crate::model::{MessageNode, MessageRecord};
use crate::policy::{ContinuationPolicy, LatestChild};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_ROOT_LABEL: &str = "main";

/// Knobs for [`build_tree`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Drop duplicates and dangling records (and pick the earliest of several
    /// roots) instead of failing.
    pub tolerant: bool,
    /// Branch id given to the root's branch.
    pub root_label: String,
    pub policy: Arc<dyn ContinuationPolicy>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            tolerant: false,
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            policy: Arc::new(LatestChild),
        }
    }
}

impl BuildOptions {
    pub fn tolerant(mut self, tolerant: bool) -> Self {
        self.tolerant = tolerant;
        self
    }

    pub fn with_root_label(mut self, label: impl Into<String>) -> Self {
        self.root_label = label.into();
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn ContinuationPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

/// A built tree plus whatever tolerant mode had to drop.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub tree: ConversationTree,
    pub warnings: Vec<BuildWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTree {
    pub root_id: String,
    pub nodes: BTreeMap<String, MessageNode>,
    /// Branch id → ids owned by that branch segment, fork side first.
    pub branches: BTreeMap<String, Vec<String>>,
    pub active_branch: String,
    /// Root-to-leaf ids of the active thread.
    pub active_path: Vec<String>,
    pub metrics: TreeMetrics,
}

/// Rebuilds the conversation tree from a flat, unordered message set.
///
/// Pure: the same logical set yields the same tree whatever its order.
pub fn build_tree(
    messages: Vec<MessageRecord>,
    options: &BuildOptions,
) -> Result<BuildOutcome, StructuralError> {
    let mut warnings = Vec::new();
    let graph = build_graph(messages, options.tolerant, &mut warnings)?;
    let policy = options.policy.as_ref();
    let labels = label_branches(&graph, &options.root_label, policy);
    let active = select_active_path(&graph, policy);
    let metrics = compute_metrics(&graph, &labels, &active);

    Ok(BuildOutcome {
        tree: ConversationTree::assemble(graph, &labels, &active, metrics),
        warnings,
    })
}

impl ConversationTree {
    fn assemble(
        graph: MessageGraph,
        labels: &BranchLabels,
        active: &ActivePath,
        metrics: TreeMetrics,
    ) -> Self {
        let id_of = |node: usize| graph.record(node).id.clone();

        let root_id = id_of(graph.root());
        let active_branch = labels.branch_id(active.leaf()).to_string();
        let active_path = active.nodes().iter().map(|&n| id_of(n)).collect();
        let branches = labels
            .segments()
            .map(|(name, nodes)| (name.to_string(), nodes.iter().map(|&n| id_of(n)).collect()))
            .collect();
        let children: Vec<Vec<String>> = (0..graph.len())
            .map(|n| graph.children(n).iter().map(|&c| id_of(c)).collect())
            .collect();

        let nodes = graph
            .into_records()
            .into_iter()
            .zip(children)
            .enumerate()
            .map(|(n, (record, children))| {
                let node = MessageNode {
                    record,
                    children,
                    branch_id: labels.branch_id(n).to_string(),
                    depth: labels.depth(n),
                    is_active: active.contains(n),
                };
                (node.record.id.clone(), node)
            })
            .collect();

        Self {
            root_id,
            nodes,
            branches,
            active_branch,
            active_path,
            metrics,
        }
    }

    pub fn node(&self, id: &str) -> Option<&MessageNode> {
        self.nodes.get(id)
    }

    pub fn active_messages(&self) -> impl Iterator<Item = &MessageNode> {
        self.active_path.iter().filter_map(|id| self.nodes.get(id))
    }

    /// The message a branch forks from, `None` for the root branch.
    pub fn branch_origin(&self, branch_id: &str) -> Option<&str> {
        let first = self.branches.get(branch_id)?.first()?;
        self.nodes.get(first)?.record.parent_id.as_deref()
    }

    /// Full root-to-end path of a branch, including the prefix it shares.
    pub fn branch_path(&self, branch_id: &str) -> Vec<&MessageNode> {
        let Some(last) = self.branches.get(branch_id).and_then(|s| s.last()) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(last);
        while let Some(node) = cursor {
            path.push(node);
            cursor = node
                .record
                .parent_id
                .as_deref()
                .and_then(|p| self.nodes.get(p));
        }
        path.reverse();
        path
    }

    /// Branches with no message on the active path, ordered by where they fork.
    pub fn alternate_branches(&self) -> Vec<(&str, &[String])> {
        let mut alternates: Vec<(&str, &[String], &MessageNode)> = self
            .branches
            .iter()
            .filter_map(|(name, ids)| {
                let first = self.nodes.get(ids.first()?)?;
                (!first.is_active).then_some((name.as_str(), ids.as_slice(), first))
            })
            .collect();
        alternates.sort_by(|a, b| {
            a.2.depth
                .cmp(&b.2.depth)
                .then_with(|| a.2.record.sibling_order(&b.2.record))
        });
        alternates
            .into_iter()
            .map(|(name, ids, _)| (name, ids))
            .collect()
    }
}
