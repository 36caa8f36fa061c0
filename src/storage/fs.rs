//! Directory-per-node storage backend.
//!
//! A node `IRL/ezj/m` lives in `<root>/IRL/ezj/m/`. Each point identifier
//! is a file named after itself, the aggregate counter and the document
//! are files with configurable names. File names starting with `.` are
//! never treated as members.

use super::{StorageBackend, StorageStats};
use crate::config::Config;
use crate::error::{GeoLodError, Result};
use crate::types::{NodeCreation, NodePath, StoredNode};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub struct FsBackend {
    root: PathBuf,
    document_name: String,
    counter_name: String,
    operations: u64,
}

impl FsBackend {
    /// Open (creating if needed) a tree rooted at `root` with default file names.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with_config(root, &Config::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(root: P, config: &Config) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| GeoLodError::storage(&root, e))?;
        Ok(Self {
            root,
            document_name: config.document_name.clone(),
            counter_name: config.counter_name.clone(),
            operations: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a node.
    pub fn node_dir(&self, path: &NodePath) -> PathBuf {
        self.root.join(path.to_relative_path())
    }

    pub fn document_path(&self, path: &NodePath) -> PathBuf {
        self.node_dir(path).join(&self.document_name)
    }

    pub fn counter_path(&self, path: &NodePath) -> PathBuf {
        self.node_dir(path).join(&self.counter_name)
    }

    fn is_member_file(&self, name: &str) -> bool {
        !name.starts_with('.') && name != self.document_name && name != self.counter_name
    }

    /// Write through a temporary sibling and rename, so readers never see a
    /// half-written counter or document.
    fn write_atomic(&mut self, target: &Path, contents: &[u8]) -> Result<()> {
        let mut temp = target.to_path_buf();
        if let Some(name) = target.file_name() {
            temp.set_file_name(format!(".{}.tmp", name.to_string_lossy()));
        }

        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(contents)?;
            file.flush()?;
            fs::rename(&temp, target)
        };
        write().map_err(|e| GeoLodError::storage(target, e))?;
        self.operations += 1;
        Ok(())
    }

    fn read_optional(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GeoLodError::storage(path, e)),
        }
    }

    fn walk(&self, dir: &Path, path: &NodePath, out: &mut Vec<StoredNode>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| GeoLodError::storage(dir, e))?;
        let mut members = Vec::new();
        let mut children = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| GeoLodError::storage(dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| GeoLodError::storage(entry.path(), e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                log::warn!("Ignoring non UTF-8 entry {:?}", entry.path());
                continue;
            };

            if file_type.is_dir() {
                if !name.starts_with('.') {
                    children.push(name);
                }
            } else if file_type.is_file() && self.is_member_file(&name) {
                members.push(name);
            }
        }

        members.sort();
        children.sort();

        if !path.is_root() {
            out.push(StoredNode {
                path: path.clone(),
                members,
            });
        }
        for child in children {
            self.walk(&dir.join(&child), &path.child(&child), out)?;
        }
        Ok(())
    }
}

impl StorageBackend for FsBackend {
    fn ensure_node(&mut self, path: &NodePath) -> Result<NodeCreation> {
        let dir = self.node_dir(path);
        match fs::create_dir(&dir) {
            Ok(()) => {
                self.operations += 1;
                Ok(NodeCreation::Created)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {
                Ok(NodeCreation::AlreadyExists)
            }
            Err(e) => Err(GeoLodError::storage(dir, e)),
        }
    }

    fn put_member(&mut self, path: &NodePath, member: &str) -> Result<bool> {
        let file_path = self.node_dir(path).join(member);
        let created = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .and_then(|mut file| file.write_all(member.as_bytes()));

        match created {
            Ok(()) => {
                self.operations += 1;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(GeoLodError::storage(file_path, e)),
        }
    }

    fn load_tree(&self) -> Result<Vec<StoredNode>> {
        let mut nodes = Vec::new();
        self.walk(&self.root, &NodePath::root(), &mut nodes)?;
        Ok(nodes)
    }

    fn read_counter(&self, path: &NodePath) -> Result<Option<u64>> {
        let counter_path = self.counter_path(path);
        let Some(text) = Self::read_optional(&counter_path)? else {
            return Ok(None);
        };
        match text.trim().parse::<u64>() {
            Ok(count) => Ok(Some(count)),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable counter {}: {}",
                    counter_path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn write_counter(&mut self, path: &NodePath, count: u64) -> Result<()> {
        let target = self.counter_path(path);
        self.write_atomic(&target, count.to_string().as_bytes())
    }

    fn read_document(&self, path: &NodePath) -> Result<Option<String>> {
        Self::read_optional(&self.document_path(path))
    }

    fn write_document(&mut self, path: &NodePath, contents: &str) -> Result<()> {
        let target = self.document_path(path);
        self.write_atomic(&target, contents.as_bytes())
    }

    fn sync(&mut self) -> Result<()> {
        // Every write closes its file; nothing is buffered here.
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats {
            operations_count: self.operations,
            ..StorageStats::default()
        };
        let root = NodePath::root();
        stats.counter_count += usize::from(self.counter_path(&root).is_file());
        stats.document_count += usize::from(self.document_path(&root).is_file());

        for node in self.load_tree()? {
            stats.node_count += 1;
            stats.member_count += node.members.len();
            stats.counter_count += usize::from(self.counter_path(&node.path).is_file());
            stats.document_count += usize::from(self.document_path(&node.path).is_file());
        }
        Ok(stats)
    }
}
