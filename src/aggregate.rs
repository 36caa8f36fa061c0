//! Bottom-up point counts with a persisted per-node cache.
//!
//! A node's aggregate is its own direct count plus the cached aggregates of
//! its children, read back from storage. Each aggregate is persisted as
//! soon as it is computed, so the post-order walk guarantees every child
//! counter exists before its parent reads it. A child whose counter is
//! missing (a partial tree from an interrupted batch) counts as zero.

use crate::error::Result;
use crate::index::SpatialBucketIndex;
use crate::storage::StorageBackend;
use crate::types::{BucketNode, NodePath};
use crate::walker::TreeWalker;
use std::collections::BTreeMap;

/// Aggregate counts of one pass, keyed by node path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateCounts {
    counts: BTreeMap<NodePath, u64>,
}

impl AggregateCounts {
    /// Aggregate of a node, zero for nodes the pass never saw.
    pub fn get(&self, path: &NodePath) -> u64 {
        self.counts.get(path).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.get(&NodePath::root())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodePath, u64)> {
        self.counts.iter().map(|(path, count)| (path, *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub nodes_visited: usize,
    /// Child counters that were absent and counted as zero.
    pub missing_counters: usize,
}

/// Computes and persists descendant point counts.
pub struct AggregationPass<'a> {
    index: &'a SpatialBucketIndex,
}

impl<'a> AggregationPass<'a> {
    pub fn new(index: &'a SpatialBucketIndex) -> Self {
        Self { index }
    }

    /// Visit every node once, children before parents.
    pub fn run<B: StorageBackend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<(AggregateCounts, AggregationReport)> {
        let mut counts = AggregateCounts::default();
        let mut report = AggregationReport::default();

        for node in TreeWalker::new(self.index).post_order() {
            let (count, missing) = self.aggregate(node, backend)?;
            counts.counts.insert(node.path().clone(), count);
            report.nodes_visited += 1;
            report.missing_counters += missing;
        }

        log::info!(
            "Aggregated {} nodes, {} points in total",
            report.nodes_visited,
            counts.total()
        );
        Ok((counts, report))
    }

    /// Recompute and persist one node from its children's cached counters.
    pub fn aggregate_node<B: StorageBackend + ?Sized>(
        &self,
        path: &NodePath,
        backend: &mut B,
    ) -> Result<u64> {
        match self.index.get(path) {
            Some(node) => Ok(self.aggregate(node, backend)?.0),
            None => Ok(0),
        }
    }

    fn aggregate<B: StorageBackend + ?Sized>(
        &self,
        node: &BucketNode,
        backend: &mut B,
    ) -> Result<(u64, usize)> {
        let mut count = node.direct_count();
        let mut missing = 0;

        for child in node.child_paths() {
            match backend.read_counter(&child)? {
                Some(cached) => count += cached,
                None => {
                    log::debug!("No cached count for {}, treating as zero", child);
                    missing += 1;
                }
            }
        }

        backend.write_counter(node.path(), count)?;
        Ok((count, missing))
    }
}
