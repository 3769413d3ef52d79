use crate::active::ActivePath;
use crate::branch::BranchLabels;
use crate::graph::MessageGraph;
use crate::model::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural statistics of a rebuilt conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetrics {
    pub total_messages: usize,
    pub total_branches: usize,
    /// Longest root-to-leaf edge count.
    pub max_depth: usize,
    /// Nodes with more than one child.
    pub branch_points: usize,
    /// Edge length of the active path.
    pub active_depth: usize,
    pub leaf_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    /// Messages owned by each branch segment.
    pub branch_distribution: BTreeMap<String, usize>,
}

pub fn compute_metrics(
    graph: &MessageGraph,
    labels: &BranchLabels,
    active: &ActivePath,
) -> TreeMetrics {
    let mut metrics = TreeMetrics {
        total_messages: graph.len(),
        active_depth: active.depth(),
        ..TreeMetrics::default()
    };

    for node in 0..graph.len() {
        match graph.children(node).len() {
            0 => metrics.leaf_count += 1,
            1 => {}
            _ => metrics.branch_points += 1,
        }
        metrics.max_depth = metrics.max_depth.max(labels.depth(node));
        match graph.record(node).role {
            Role::User => metrics.user_messages += 1,
            Role::Assistant => metrics.assistant_messages += 1,
            Role::System => metrics.system_messages += 1,
        }
        *metrics
            .branch_distribution
            .entry(labels.branch_id(node).to_string())
            .or_default() += 1;
    }
    metrics.total_branches = metrics.branch_distribution.len();
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::select_active_path;
    use crate::branch::label_branches;
    use crate::graph::build_graph;
    use crate::model::{MessageRecord, test_record};
    use crate::policy::LatestChild;

    fn metrics_for(records: Vec<MessageRecord>) -> TreeMetrics {
        let graph = build_graph(records, false, &mut Vec::new()).unwrap();
        let labels = label_branches(&graph, "main", &LatestChild);
        let active = select_active_path(&graph, &LatestChild);
        compute_metrics(&graph, &labels, &active)
    }

    #[test]
    fn linear_conversation_of_ten() {
        let mut records = vec![test_record("m0", None, 0)];
        for i in 1..10 {
            records.push(test_record(&format!("m{i}"), Some(&format!("m{}", i - 1)), i));
        }
        let metrics = metrics_for(records);

        assert_eq!(metrics.total_messages, 10);
        assert_eq!(metrics.total_branches, 1);
        assert_eq!(metrics.branch_points, 0);
        assert_eq!(metrics.max_depth, 9);
        assert_eq!(metrics.active_depth, 9);
        assert_eq!(metrics.leaf_count, 1);
        assert_eq!(metrics.branch_distribution["main"], 10);
    }

    #[test]
    fn short_active_reply_beside_a_deeper_branch() {
        let metrics = metrics_for(vec![
            test_record("1", None, 0),
            test_record("2", Some("1"), 1),
            test_record("4", Some("2"), 2),
            test_record("3", Some("1"), 3),
        ]);

        assert_eq!(metrics.max_depth, 2);
        assert_eq!(metrics.active_depth, 1);
        assert_eq!(metrics.branch_points, 1);
        assert_eq!(metrics.total_branches, metrics.branch_points + 1);
        assert_eq!(metrics.user_messages, 1);
        assert_eq!(metrics.assistant_messages, 3);
        assert_eq!(
            metrics.branch_distribution,
            BTreeMap::from([("main".to_string(), 2), ("branch_1".to_string(), 2)])
        );
    }
}
