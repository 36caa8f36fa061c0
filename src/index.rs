//! Prefix trie over `country + geohash` segments.
//!
//! The trie lives in memory and every structural change is written through
//! a [`StorageBackend`], so a tree persisted by one batch can be reopened
//! with [`SpatialBucketIndex::load`] and extended by the next.

use crate::config::SegmentLayout;
use crate::error::{GeoLodError, Result};
use crate::record::{PlaceRecord, RecordParser};
use crate::storage::StorageBackend;
use crate::types::{BucketNode, NodeCreation, NodePath};
use std::collections::BTreeMap;

/// What a single insertion changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Deepest node on the record's path, where the id is stored.
    pub path: NodePath,
    pub nodes_created: usize,
    /// `false` when the id was already stored there.
    pub new_member: bool,
}

/// Summary of ingesting a batch of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub lines_read: usize,
    pub blank_lines: usize,
    pub malformed: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub nodes_created: usize,
}

pub struct SpatialBucketIndex {
    layout: SegmentLayout,
    nodes: BTreeMap<NodePath, BucketNode>,
}

impl SpatialBucketIndex {
    /// Create an empty index holding only the synthetic root.
    pub fn new(layout: SegmentLayout) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodePath::root(), BucketNode::new(NodePath::root()));
        Self { layout, nodes }
    }

    /// Rebuild the in-memory trie from whatever the backend has persisted.
    pub fn load<B: StorageBackend + ?Sized>(layout: SegmentLayout, backend: &B) -> Result<Self> {
        let mut index = Self::new(layout);
        for stored in backend.load_tree()? {
            index.attach(&stored.path);
            if let Some(node) = index.nodes.get_mut(&stored.path) {
                for member in &stored.members {
                    node.add_member(member);
                }
            }
        }
        log::debug!("Loaded {} nodes from storage", index.nodes.len() - 1);
        Ok(index)
    }

    /// Insert a record, creating any missing node along its path.
    ///
    /// Already existing nodes and already stored ids are left untouched.
    pub fn insert<B: StorageBackend + ?Sized>(
        &mut self,
        record: &PlaceRecord,
        backend: &mut B,
    ) -> Result<InsertOutcome> {
        let path = NodePath::for_record(&self.layout, record);
        let mut nodes_created = 0;

        for prefix in path.prefixes() {
            if self.nodes.contains_key(&prefix) {
                continue;
            }
            if backend.ensure_node(&prefix)? == NodeCreation::Created {
                nodes_created += 1;
            }
            self.attach(&prefix);
        }

        let member = record.identifier();
        let node = self.nodes.get_mut(&path).ok_or_else(|| {
            GeoLodError::Other(format!("node {} missing after creation", path))
        })?;

        let new_member = if node.has_member(&member) {
            false
        } else {
            backend.put_member(&path, &member)?;
            node.add_member(&member)
        };

        Ok(InsertOutcome {
            path,
            nodes_created,
            new_member,
        })
    }

    /// Parse and insert a batch of lines.
    ///
    /// Malformed lines are logged and counted; storage failures abort the batch.
    pub fn ingest<B, I, S>(&mut self, lines: I, backend: &mut B) -> Result<IngestReport>
    where
        B: StorageBackend + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parser = RecordParser::new(self.layout);
        let mut report = IngestReport::default();

        for line in lines {
            let line = line.as_ref();
            report.lines_read += 1;

            if line.trim().is_empty() {
                report.blank_lines += 1;
                continue;
            }

            let record = match parser.parse(line) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping record: {}", e);
                    report.malformed += 1;
                    continue;
                }
            };

            let outcome = self.insert(&record, backend)?;
            report.nodes_created += outcome.nodes_created;
            if outcome.new_member {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }

        log::info!(
            "Ingested {} lines: {} inserted, {} duplicates, {} malformed",
            report.lines_read,
            report.inserted,
            report.duplicates,
            report.malformed
        );
        Ok(report)
    }

    /// Add a node and link it to its parent, creating in-memory ancestors as needed.
    fn attach(&mut self, path: &NodePath) {
        for prefix in path.prefixes() {
            if self.nodes.contains_key(&prefix) {
                continue;
            }
            if let (Some(parent), Some(segment)) = (prefix.parent(), prefix.last_segment())
                && let Some(parent_node) = self.nodes.get_mut(&parent)
            {
                parent_node.add_child(segment);
            }
            self.nodes.insert(prefix.clone(), BucketNode::new(prefix));
        }
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn root(&self) -> &BucketNode {
        &self.nodes[&NodePath::root()]
    }

    pub fn get(&self, path: &NodePath) -> Option<&BucketNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.nodes.contains_key(path)
    }

    /// All nodes in path order (parents before children), root first.
    pub fn nodes(&self) -> impl Iterator<Item = &BucketNode> {
        self.nodes.values()
    }

    /// Country nodes in code order.
    pub fn countries(&self) -> impl Iterator<Item = &BucketNode> {
        self.root().child_paths().filter_map(|p| self.nodes.get(&p))
    }

    /// Number of nodes, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of stored point ids.
    pub fn point_count(&self) -> u64 {
        self.nodes.values().map(BucketNode::direct_count).sum()
    }
}
