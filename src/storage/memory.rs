//! In-memory storage backend.

use super::{StorageBackend, StorageStats};
use crate::error::{GeoLodError, Result};
use crate::types::{NodeCreation, NodePath, StoredNode};
use std::collections::{BTreeMap, BTreeSet};
use std::io;

#[derive(Debug, Clone, Default)]
struct MemoryNode {
    members: BTreeSet<String>,
    counter: Option<u64>,
    document: Option<String>,
}

/// In-memory storage backend using BTreeMap
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    nodes: BTreeMap<NodePath, MemoryNode>,
    operations: u64,
}

impl MemoryBackend {
    /// Create a new backend holding only the root node
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodePath::root(), MemoryNode::default());
        Self {
            nodes,
            operations: 0,
        }
    }

    fn node(&self, path: &NodePath) -> Result<&MemoryNode> {
        self.nodes.get(path).ok_or_else(|| missing(path))
    }

    fn node_mut(&mut self, path: &NodePath) -> Result<&mut MemoryNode> {
        self.nodes.get_mut(path).ok_or_else(|| missing(path))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(path: &NodePath) -> GeoLodError {
    GeoLodError::storage(
        path.to_relative_path(),
        io::Error::new(io::ErrorKind::NotFound, "node does not exist"),
    )
}

impl StorageBackend for MemoryBackend {
    fn ensure_node(&mut self, path: &NodePath) -> Result<NodeCreation> {
        if self.nodes.contains_key(path) {
            return Ok(NodeCreation::AlreadyExists);
        }
        if let Some(parent) = path.parent() {
            self.node(&parent)?;
        }
        self.nodes.insert(path.clone(), MemoryNode::default());
        self.operations += 1;
        Ok(NodeCreation::Created)
    }

    fn put_member(&mut self, path: &NodePath, member: &str) -> Result<bool> {
        let inserted = self.node_mut(path)?.members.insert(member.to_string());
        self.operations += 1;
        Ok(inserted)
    }

    fn load_tree(&self) -> Result<Vec<StoredNode>> {
        Ok(self
            .nodes
            .iter()
            .filter(|(path, _)| !path.is_root())
            .map(|(path, node)| StoredNode {
                path: path.clone(),
                members: node.members.iter().cloned().collect(),
            })
            .collect())
    }

    fn read_counter(&self, path: &NodePath) -> Result<Option<u64>> {
        Ok(self.nodes.get(path).and_then(|node| node.counter))
    }

    fn write_counter(&mut self, path: &NodePath, count: u64) -> Result<()> {
        self.node_mut(path)?.counter = Some(count);
        self.operations += 1;
        Ok(())
    }

    fn read_document(&self, path: &NodePath) -> Result<Option<String>> {
        Ok(self.nodes.get(path).and_then(|node| node.document.clone()))
    }

    fn write_document(&mut self, path: &NodePath, contents: &str) -> Result<()> {
        self.node_mut(path)?.document = Some(contents.to_string());
        self.operations += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats {
            operations_count: self.operations,
            ..StorageStats::default()
        };
        for (path, node) in &self.nodes {
            if !path.is_root() {
                stats.node_count += 1;
            }
            stats.member_count += node.members.len();
            stats.counter_count += usize::from(node.counter.is_some());
            stats.document_count += usize::from(node.document.is_some());
        }
        Ok(stats)
    }
}
