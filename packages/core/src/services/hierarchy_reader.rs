//! Nested Tree Assembly
//!
//! `HierarchyReader` turns the flat `nodes` row set into the nested
//! `TreeSnapshot` view. Reconstructing in memory instead of with a
//! recursive database query keeps the algorithm independent of the storage
//! engine's query language.
//!
//! `build_tree` is pure and deterministic: the same row set always produces
//! the same snapshot, and it is re-executed on every read rather than
//! cached.

use std::collections::{HashMap, HashSet};

use crate::models::{Node, TreeBranch, TreeSnapshot};

pub struct HierarchyReader;

impl HierarchyReader {
    /// Assemble the nested view from a flat row set.
    ///
    /// Rows are grouped by `parent_id` (null keys the root group), each
    /// group is sorted by position ascending with ties broken by id
    /// ascending (defensive - under the store invariant positions never
    /// tie), and children are attached recursively. Every row appears in
    /// the snapshot exactly once.
    ///
    /// Rows whose `parent_id` references an id absent from the set are
    /// surfaced as `orphans` together with their own (intact) subtrees,
    /// never silently dropped or attached to root.
    pub fn build_tree(rows: Vec<Node>) -> TreeSnapshot {
        let ids: HashSet<String> = rows.iter().map(|n| n.id.clone()).collect();

        let mut root_group: Vec<Node> = Vec::new();
        let mut orphan_tops: Vec<Node> = Vec::new();
        let mut by_parent: HashMap<String, Vec<Node>> = HashMap::new();

        for row in rows {
            match &row.parent_id {
                None => root_group.push(row),
                Some(parent) if ids.contains(parent) => {
                    by_parent.entry(parent.clone()).or_default().push(row);
                }
                Some(_) => orphan_tops.push(row),
            }
        }

        Self::sort_group(&mut root_group);
        Self::sort_group(&mut orphan_tops);
        for group in by_parent.values_mut() {
            Self::sort_group(group);
        }

        let roots = root_group
            .into_iter()
            .map(|node| Self::attach(node, &mut by_parent))
            .collect();

        let mut orphans: Vec<TreeBranch> = orphan_tops
            .into_iter()
            .map(|node| Self::attach(node, &mut by_parent))
            .collect();

        // Rows still unattached can only sit on a parent cycle (corrupt
        // data). Break the smallest-keyed link deterministically and surface
        // the remainder as orphans as well.
        while !by_parent.is_empty() {
            let key = by_parent
                .keys()
                .min()
                .cloned()
                .unwrap_or_default();
            let group = by_parent.remove(&key).unwrap_or_default();
            for node in group {
                orphans.push(Self::attach(node, &mut by_parent));
            }
        }

        TreeSnapshot { roots, orphans }
    }

    fn sort_group(group: &mut [Node]) {
        group.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
    }

    fn attach(node: Node, by_parent: &mut HashMap<String, Vec<Node>>) -> TreeBranch {
        let children = by_parent.remove(&node.id).unwrap_or_default();
        TreeBranch {
            node,
            children: children
                .into_iter()
                .map(|child| Self::attach(child, by_parent))
                .collect(),
        }
    }
}
