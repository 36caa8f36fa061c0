//! Core tree types shared by the index, the passes and the storage layer.
use crate::config::SegmentLayout;
use crate::record::PlaceRecord;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Location of a node in the prefix trie: country code, then geohash segments.
///
/// The empty path is the synthetic root covering all countries. Paths order
/// lexicographically by segment, so a parent always sorts before its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath {
    segments: SmallVec<[String; 8]>,
}

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a record's `country + geohash` into segments.
    ///
    /// ```
    /// use geolod::config::SegmentLayout;
    /// use geolod::record::RecordParser;
    /// use geolod::types::NodePath;
    ///
    /// let record = RecordParser::default().parse("IRLezjmd-a1").unwrap();
    /// let path = NodePath::for_record(&SegmentLayout::default(), &record);
    /// assert_eq!(path.to_string(), "IRL/ezj/m/d");
    /// ```
    pub fn for_record(layout: &SegmentLayout, record: &PlaceRecord) -> Self {
        let geohash = record.geohash();
        let geohash = &geohash[..geohash.len().min(layout.max_geohash_len)];
        let (first, rest) = geohash.split_at(layout.first_geohash_width.min(geohash.len()));

        let mut segments: SmallVec<[String; 8]> = SmallVec::new();
        segments.push(record.country_code().to_string());
        segments.push(first.to_string());
        segments.extend(rest.chars().map(String::from));
        Self { segments }
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Every path from the first segment down to `self`, root excluded.
    pub fn prefixes(&self) -> impl Iterator<Item = NodePath> + '_ {
        (1..=self.segments.len()).map(|len| Self {
            segments: self.segments[..len].iter().cloned().collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Number of segments; the root has depth 0, countries depth 1.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_country(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn country(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The geohash this node covers, empty for the root and for countries.
    pub fn geohash(&self) -> String {
        self.segments.iter().skip(1).map(String::as_str).collect()
    }

    /// Relative filesystem location isomorphic to the path.
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        f.write_str(&self.segments.join("/"))
    }
}

/// A node of the prefix trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketNode {
    path: NodePath,
    members: BTreeSet<String>,
    children: BTreeSet<String>,
}

impl BucketNode {
    pub fn new(path: NodePath) -> Self {
        Self {
            path,
            members: BTreeSet::new(),
            children: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn level(&self) -> usize {
        self.path.depth()
    }

    /// Points stored exactly at this node.
    pub fn direct_count(&self) -> u64 {
        self.members.len() as u64
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Immediate child segment names, in sorted order.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    pub fn child_paths(&self) -> impl Iterator<Item = NodePath> + '_ {
        self.children.iter().map(|c| self.path.child(c))
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    pub(crate) fn add_member(&mut self, member: &str) -> bool {
        self.members.insert(member.to_string())
    }

    pub(crate) fn add_child(&mut self, segment: &str) -> bool {
        self.children.insert(segment.to_string())
    }
}

/// Outcome of a create-if-absent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCreation {
    Created,
    AlreadyExists,
}

/// A node as reloaded from a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub path: NodePath,
    pub members: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordParser;

    #[test]
    fn test_path_for_record() {
        let layout = SegmentLayout::default();
        let record = RecordParser::new(layout).parse("FRAu09tv-b1").unwrap();
        let path = NodePath::for_record(&layout, &record);
        assert_eq!(path.segments(), &["FRA", "u09", "t", "v"]);
        assert_eq!(path.depth(), 4);
        assert_eq!(path.geohash(), "u09tv");
        assert_eq!(path.country(), Some("FRA"));
    }

    #[test]
    fn test_path_truncated_to_layout_depth() {
        let layout = SegmentLayout {
            max_geohash_len: 4,
            ..SegmentLayout::default()
        };
        let record = RecordParser::new(layout).parse("FRAu09tvwx-b1").unwrap();
        let path = NodePath::for_record(&layout, &record);
        assert_eq!(path.to_string(), "FRA/u09/t");
    }

    #[test]
    fn test_parent_child_and_prefixes() {
        let path = NodePath::from_segments(["IRL", "ezj", "m"]);
        assert_eq!(path.parent().unwrap(), NodePath::from_segments(["IRL", "ezj"]));
        assert_eq!(path.child("d").last_segment(), Some("d"));
        assert!(NodePath::root().parent().is_none());

        let prefixes: Vec<String> = path.prefixes().map(|p| p.to_string()).collect();
        assert_eq!(prefixes, vec!["IRL", "IRL/ezj", "IRL/ezj/m"]);
    }

    #[test]
    fn test_parent_sorts_before_child() {
        let parent = NodePath::from_segments(["IRL", "ezj"]);
        let child = parent.child("0");
        let sibling = NodePath::from_segments(["IRL", "ezk"]);
        assert!(parent < child);
        assert!(child < sibling);
        assert!(NodePath::root() < parent);
    }

    #[test]
    fn test_display_and_relative_path() {
        assert_eq!(NodePath::root().to_string(), "<root>");
        let path = NodePath::from_segments(["IRL", "ezj"]);
        assert_eq!(path.to_relative_path(), PathBuf::from("IRL").join("ezj"));
    }

    #[test]
    fn test_bucket_node_membership() {
        let mut node = BucketNode::new(NodePath::from_segments(["IRL", "ezj"]));
        assert!(!node.has_member("IRLezj-a1"));
        assert!(node.add_member("IRLezj-a1"));
        assert!(!node.add_member("IRLezj-a1"));
        assert!(node.has_member("IRLezj-a1"));
        assert!(!node.has_member("IRLezj-a2"));
        assert_eq!(node.direct_count(), 1);
    }
}
