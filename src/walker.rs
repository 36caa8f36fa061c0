//! Traversal orders over the bucket tree.

use crate::index::SpatialBucketIndex;
use crate::types::{BucketNode, NodePath};

/// Walks a [`SpatialBucketIndex`] in the orders the passes rely on.
///
/// Children are always visited in segment order, so every walk is
/// deterministic.
#[derive(Clone, Copy)]
pub struct TreeWalker<'a> {
    index: &'a SpatialBucketIndex,
}

impl<'a> TreeWalker<'a> {
    pub fn new(index: &'a SpatialBucketIndex) -> Self {
        Self { index }
    }

    /// Children strictly before their parent; the root comes last.
    pub fn post_order(&self) -> Vec<&'a BucketNode> {
        self.post_order_from(&NodePath::root())
    }

    pub fn post_order_from(&self, start: &NodePath) -> Vec<&'a BucketNode> {
        let mut out = Vec::new();
        let Some(start) = self.index.get(start) else {
            return out;
        };

        // (node, children already pushed)
        let mut stack = vec![(start, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            stack.push((node, true));
            let children: Vec<&BucketNode> = self.children(node).collect();
            for child in children.into_iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// Parents before their children; the root comes first.
    pub fn pre_order(&self) -> Vec<&'a BucketNode> {
        self.pre_order_from(&NodePath::root())
    }

    pub fn pre_order_from(&self, start: &NodePath) -> Vec<&'a BucketNode> {
        let mut out = Vec::new();
        let Some(start) = self.index.get(start) else {
            return out;
        };

        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            out.push(node);
            let children: Vec<&BucketNode> = self.children(node).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Nodes grouped by depth, deepest level first.
    ///
    /// Every node of one level can be processed independently once the
    /// previous (deeper) level is done.
    pub fn levels(&self) -> Vec<Vec<&'a BucketNode>> {
        let mut levels: Vec<Vec<&'a BucketNode>> = Vec::new();
        for node in self.pre_order() {
            let depth = node.level();
            if levels.len() <= depth {
                levels.resize_with(depth + 1, Vec::new);
            }
            levels[depth].push(node);
        }
        levels.reverse();
        levels
    }

    /// Nodes at exactly `depth`, in path order.
    pub fn at_depth(self, depth: usize) -> impl Iterator<Item = &'a BucketNode> + 'a {
        self.index.nodes().filter(move |n| n.level() == depth)
    }

    pub fn children(self, node: &'a BucketNode) -> impl Iterator<Item = &'a BucketNode> + 'a {
        let index = self.index;
        node.child_paths().filter_map(move |p| index.get(&p))
    }
}
