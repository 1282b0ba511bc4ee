//! Nested Tree Views
//!
//! `TreeBranch` and `TreeSnapshot` are the in-memory nested shapes assembled
//! by the hierarchy reader from the flat `nodes` row set. They are plain
//! values: rebuilt on every read, never cached, never persisted.

use serde::{Deserialize, Serialize};

use super::Node;

/// One node together with its ordered children, recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeBranch {
    pub node: Node,
    pub children: Vec<TreeBranch>,
}

impl TreeBranch {
    /// Flatten this branch back into rows, depth-first, parents before
    /// children. Useful for round-trip checks against the flat row set.
    pub fn flatten_into(&self, out: &mut Vec<Node>) {
        out.push(self.node.clone());
        for child in &self.children {
            child.flatten_into(out);
        }
    }

    /// Total number of nodes in this branch, including the branch root.
    /// Always at least 1, so there is no matching `is_empty`.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeBranch::len).sum::<usize>()
    }
}

/// Full nested view of the store.
///
/// `roots` holds the null-parent group in position order. `orphans` holds
/// subtrees whose topmost row references a parent missing from the row set;
/// they are surfaced here rather than silently dropped or attached to root.
/// Under the store's invariants `orphans` is always empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TreeSnapshot {
    pub roots: Vec<TreeBranch>,
    pub orphans: Vec<TreeBranch>,
}

impl TreeSnapshot {
    /// Total number of nodes in the snapshot, orphan subtrees included
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(TreeBranch::len).sum::<usize>()
            + self.orphans.iter().map(TreeBranch::len).sum::<usize>()
    }

    /// Flatten the whole snapshot into rows, depth-first per root
    pub fn flatten(&self) -> Vec<Node> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.flatten_into(&mut out);
        }
        for orphan in &self.orphans {
            orphan.flatten_into(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> TreeBranch {
        TreeBranch {
            node: Node::new(name.to_string(), None, 0),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_branch_len_counts_all_nodes() {
        let mut branch = leaf("root");
        branch.children.push(leaf("a"));
        branch.children.push(leaf("b"));
        branch.children[0].children.push(leaf("a1"));
        assert_eq!(branch.len(), 4);
    }

    #[test]
    fn test_snapshot_flatten_is_depth_first() {
        let mut root = leaf("root");
        root.children.push(leaf("a"));
        root.children[0].children.push(leaf("a1"));
        root.children.push(leaf("b"));

        let snapshot = TreeSnapshot {
            roots: vec![root],
            orphans: Vec::new(),
        };

        let names: Vec<String> = snapshot.flatten().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["root", "a", "a1", "b"]);
        assert_eq!(snapshot.node_count(), 4);
    }
}
