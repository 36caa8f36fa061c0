//! Storage backend abstraction for the bucket tree.
//!
//! The index keeps the trie in memory and writes every structural change
//! through a [`StorageBackend`], which also holds the per-node aggregate
//! counters and the generated documents. A backend can reload a tree built
//! by an earlier batch so later batches extend it.

use crate::error::Result;
use crate::types::{NodeCreation, NodePath, StoredNode};

mod fs;
mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

/// Trait for storage backend implementations
pub trait StorageBackend: Send + Sync {
    /// Create the node if it does not exist yet. The parent must exist.
    ///
    /// Finding the node already present is success
    /// ([`NodeCreation::AlreadyExists`]), never an error.
    fn ensure_node(&mut self, path: &NodePath) -> Result<NodeCreation>;

    /// Store a point identifier at a node. Returns `false` if it was already there.
    fn put_member(&mut self, path: &NodePath, member: &str) -> Result<bool>;

    /// Every persisted node with its direct members, root excluded.
    fn load_tree(&self) -> Result<Vec<StoredNode>>;

    /// Read a node's cached aggregate count; `None` if no counter was persisted.
    fn read_counter(&self, path: &NodePath) -> Result<Option<u64>>;

    fn write_counter(&mut self, path: &NodePath, count: u64) -> Result<()>;

    fn read_document(&self, path: &NodePath) -> Result<Option<String>>;

    fn write_document(&mut self, path: &NodePath, contents: &str) -> Result<()>;

    /// Flush any pending writes to persistent storage
    fn sync(&mut self) -> Result<()>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;
}

impl<T: StorageBackend + ?Sized> StorageBackend for Box<T> {
    fn ensure_node(&mut self, path: &NodePath) -> Result<NodeCreation> {
        (**self).ensure_node(path)
    }

    fn put_member(&mut self, path: &NodePath, member: &str) -> Result<bool> {
        (**self).put_member(path, member)
    }

    fn load_tree(&self) -> Result<Vec<StoredNode>> {
        (**self).load_tree()
    }

    fn read_counter(&self, path: &NodePath) -> Result<Option<u64>> {
        (**self).read_counter(path)
    }

    fn write_counter(&mut self, path: &NodePath, count: u64) -> Result<()> {
        (**self).write_counter(path, count)
    }

    fn read_document(&self, path: &NodePath) -> Result<Option<String>> {
        (**self).read_document(path)
    }

    fn write_document(&mut self, path: &NodePath, contents: &str) -> Result<()> {
        (**self).write_document(path, contents)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn stats(&self) -> Result<StorageStats> {
        (**self).stats()
    }
}

/// Storage backend statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Nodes, root excluded
    pub node_count: usize,
    pub member_count: usize,
    pub counter_count: usize,
    pub document_count: usize,
    /// Number of write operations performed by this backend instance
    pub operations_count: u64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::GeoLodError;
    use std::collections::BTreeSet;

    /// Wraps a memory backend and fails document writes for chosen nodes.
    pub struct FailingDocuments {
        pub inner: MemoryBackend,
        pub fail_on: BTreeSet<NodePath>,
    }

    impl FailingDocuments {
        pub fn new(fail_on: impl IntoIterator<Item = NodePath>) -> Self {
            Self {
                inner: MemoryBackend::new(),
                fail_on: fail_on.into_iter().collect(),
            }
        }
    }

    impl StorageBackend for FailingDocuments {
        fn ensure_node(&mut self, path: &NodePath) -> Result<NodeCreation> {
            self.inner.ensure_node(path)
        }

        fn put_member(&mut self, path: &NodePath, member: &str) -> Result<bool> {
            self.inner.put_member(path, member)
        }

        fn load_tree(&self) -> Result<Vec<StoredNode>> {
            self.inner.load_tree()
        }

        fn read_counter(&self, path: &NodePath) -> Result<Option<u64>> {
            self.inner.read_counter(path)
        }

        fn write_counter(&mut self, path: &NodePath, count: u64) -> Result<()> {
            self.inner.write_counter(path, count)
        }

        fn read_document(&self, path: &NodePath) -> Result<Option<String>> {
            self.inner.read_document(path)
        }

        fn write_document(&mut self, path: &NodePath, contents: &str) -> Result<()> {
            if self.fail_on.contains(path) {
                return Err(GeoLodError::storage(
                    path.to_relative_path(),
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            self.inner.write_document(path, contents)
        }

        fn sync(&mut self) -> Result<()> {
            self.inner.sync()
        }

        fn stats(&self) -> Result<StorageStats> {
            self.inner.stats()
        }
    }
}
