use crate::graph::MessageGraph;
use crate::policy::{ContinuationPolicy, continuing_child};

/// The root-to-leaf thread a live chat view would show.
#[derive(Debug)]
pub struct ActivePath {
    nodes: Vec<usize>,
    on_path: Vec<bool>,
}

impl ActivePath {
    /// Nodes from the root down to the leaf.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn contains(&self, node: usize) -> bool {
        self.on_path[node]
    }

    pub fn leaf(&self) -> usize {
        self.nodes[self.nodes.len() - 1]
    }

    /// Edge length of the path.
    pub fn depth(&self) -> usize {
        self.nodes.len() - 1
    }
}

/// Follows the continuing child from the root until a leaf is reached.
pub fn select_active_path(graph: &MessageGraph, policy: &dyn ContinuationPolicy) -> ActivePath {
    let mut on_path = vec![false; graph.len()];
    let mut nodes = Vec::new();
    let mut cursor = graph.root();
    loop {
        on_path[cursor] = true;
        nodes.push(cursor);
        match continuing_child(policy, graph, cursor) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    ActivePath { nodes, on_path }
}
