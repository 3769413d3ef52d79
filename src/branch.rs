use crate::graph::MessageGraph;
use crate::policy::{ContinuationPolicy, continuing_child};

/// Branch id and depth of every node, plus each branch's exclusive segment.
#[derive(Debug)]
pub struct BranchLabels {
    names: Vec<String>,
    branch_of: Vec<usize>,
    depth: Vec<usize>,
    segments: Vec<Vec<usize>>,
}

impl BranchLabels {
    pub fn branch_count(&self) -> usize {
        self.names.len()
    }

    pub fn branch_id(&self, node: usize) -> &str {
        &self.names[self.branch_of[node]]
    }

    pub fn depth(&self, node: usize) -> usize {
        self.depth[node]
    }

    /// `(branch id, nodes)` pairs in minting order, the root branch first.
    /// Each segment runs from its fork-side end towards its leaf.
    pub fn segments(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.segments.iter().map(Vec::as_slice))
    }
}

/// Walks the tree from the root and labels every node.
///
/// At a fork the child picked by `policy` keeps the current branch; every
/// other child starts a new `branch_<n>` segment, numbered in sibling order
/// when the fork is reached. The continuing subtree is walked first, so
/// numbering only depends on the tree's shape and sibling order.
pub fn label_branches(
    graph: &MessageGraph,
    root_label: &str,
    policy: &dyn ContinuationPolicy,
) -> BranchLabels {
    let n = graph.len();
    let mut labels = BranchLabels {
        names: vec![root_label.to_string()],
        branch_of: vec![0; n],
        depth: vec![0; n],
        segments: vec![Vec::new()],
    };
    let mut counter = 0usize;

    // (node, branch, depth); explicit stack so deep threads cannot overflow.
    let mut stack = vec![(graph.root(), 0usize, 0usize)];
    while let Some((node, branch, depth)) = stack.pop() {
        labels.branch_of[node] = branch;
        labels.depth[node] = depth;
        labels.segments[branch].push(node);

        let Some(next) = continuing_child(policy, graph, node) else {
            continue;
        };

        let mut forks = Vec::new();
        for &child in graph.children(node) {
            if child == next {
                continue;
            }
            let name = loop {
                counter += 1;
                let candidate = format!("branch_{counter}");
                if candidate != root_label {
                    break candidate;
                }
            };
            labels.names.push(name);
            labels.segments.push(Vec::new());
            forks.push((child, labels.names.len() - 1));
        }

        for &(child, fork) in forks.iter().rev() {
            stack.push((child, fork, depth + 1));
        }
        stack.push((next, branch, depth + 1));
    }

    labels
}
