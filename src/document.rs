//! Per-node output documents with level-of-detail gated links.
//!
//! The root document links every country, a country document links its
//! first-level geohash cells, and every cell links its finer children. A
//! viewer only fetches a linked document once the link's region covers
//! enough pixels, so the whole tree loads lazily.

use crate::aggregate::AggregateCounts;
use crate::config::{Config, LodRange, RebuildPolicy};
use crate::context::SpatialIndexContext;
use crate::coverage::cell_bounds;
use crate::error::{GeoLodError, Result};
use crate::index::SpatialBucketIndex;
use crate::kml;
use crate::record::RecordParser;
use crate::storage::StorageBackend;
use crate::types::NodePath;
use crate::walker::TreeWalker;
use geo::{Coord, Rect};
use rustc_hash::{FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

/// A link to a child document.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDescriptor {
    pub target: NodePath,
    pub name: String,
    /// Location of the child document relative to this one.
    pub href: String,
    pub region: Rect<f64>,
    pub lod: LodRange,
}

/// A point stored directly at a node, placed at the center of its geohash.
#[derive(Debug, Clone, PartialEq)]
pub struct PointMark {
    pub name: String,
    pub position: Coord<f64>,
}

/// The values a document embeds to let later runs tell whether it is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BakedState {
    pub aggregate_count: u64,
    pub link_count: usize,
    /// Hash over everything the document renders.
    pub fingerprint: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    pub path: NodePath,
    pub name: String,
    pub description: String,
    /// `None` only for the root of an empty tree.
    pub region: Option<Rect<f64>>,
    pub aggregate_count: u64,
    /// Outline extrusion, proportional to the aggregate count.
    pub extrude_height: f64,
    pub links: Vec<LinkDescriptor>,
    pub points: Vec<PointMark>,
}

impl OutputDocument {
    pub fn baked_state(&self) -> BakedState {
        BakedState {
            aggregate_count: self.aggregate_count,
            link_count: self.links.len(),
            fingerprint: self.fingerprint(),
        }
    }

    /// Stable hash of the rendered content. Any change to names, regions,
    /// extrusion, links or points changes it.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.path.hash(&mut hasher);
        self.name.hash(&mut hasher);
        self.description.hash(&mut hasher);
        self.region.map(rect_bits).hash(&mut hasher);
        self.aggregate_count.hash(&mut hasher);
        self.extrude_height.to_bits().hash(&mut hasher);

        (self.links.len() as u64).hash(&mut hasher);
        for link in &self.links {
            link.target.hash(&mut hasher);
            link.name.hash(&mut hasher);
            link.href.hash(&mut hasher);
            rect_bits(link.region).hash(&mut hasher);
            link.lod.min_pixels.hash(&mut hasher);
            link.lod.max_pixels.hash(&mut hasher);
        }

        (self.points.len() as u64).hash(&mut hasher);
        for point in &self.points {
            point.name.hash(&mut hasher);
            point.position.x.to_bits().hash(&mut hasher);
            point.position.y.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn rect_bits(rect: Rect<f64>) -> [u64; 4] {
    [
        rect.min().x.to_bits(),
        rect.min().y.to_bits(),
        rect.max().x.to_bits(),
        rect.max().y.to_bits(),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    SkippedClean,
    SkippedExisting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub written: usize,
    pub skipped_clean: usize,
    pub skipped_existing: usize,
    /// Nodes whose document could not be produced, with the reason.
    pub failed: Vec<(NodePath, String)>,
    /// Descendants of failed nodes that were not attempted.
    pub suppressed: usize,
}

impl GenerationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct DocumentBuilder<'a> {
    index: &'a SpatialBucketIndex,
    counts: &'a AggregateCounts,
    context: &'a SpatialIndexContext,
    config: &'a Config,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(
        index: &'a SpatialBucketIndex,
        counts: &'a AggregateCounts,
        context: &'a SpatialIndexContext,
        config: &'a Config,
    ) -> Self {
        Self {
            index,
            counts,
            context,
            config,
        }
    }

    /// Bounding box of a node's region.
    ///
    /// Cells use their geohash box, countries the box of their coverage
    /// (or of their children when no coverage was accumulated) and the
    /// root the box of all countries.
    pub fn region_of(&self, path: &NodePath) -> Result<Option<Rect<f64>>> {
        if path.depth() > 1 {
            return cell_bounds(&path.geohash()).map(Some);
        }
        if let Some(code) = path.country()
            && let Some(coverage) = self.context.coverage(code)
        {
            return Ok(Some(coverage.bounding_rect()));
        }

        let mut merged = None;
        if let Some(node) = self.index.get(path) {
            for child in node.child_paths() {
                if let Some(region) = self.region_of(&child)? {
                    merged = Some(merge_rects(merged, region));
                }
            }
        }
        Ok(merged)
    }

    /// Build the document for one node.
    pub fn render(&self, path: &NodePath) -> Result<OutputDocument> {
        let node = self
            .index
            .get(path)
            .ok_or_else(|| GeoLodError::Other(format!("no node at {}", path)))?;
        let count = self.counts.get(path);

        let mut links = Vec::with_capacity(node.child_count());
        for child in node.child_paths() {
            let Some(region) = self.region_of(&child)? else {
                continue;
            };
            let segment = child.last_segment().unwrap_or_default();
            links.push(LinkDescriptor {
                name: self.display_name(&child),
                href: format!("{}/{}", segment, self.config.document_name),
                target: child,
                region,
                lod: self.config.lod,
            });
        }

        let parser = RecordParser::new(*self.index.layout());
        let points = node
            .members()
            .filter_map(|member| {
                let record = parser.parse(member).ok()?;
                let (position, _, _) = geohash::decode(record.geohash()).ok()?;
                Some(PointMark {
                    name: member.to_string(),
                    position,
                })
            })
            .collect();

        Ok(OutputDocument {
            path: path.clone(),
            name: self.display_name(path),
            description: self.describe(path, count),
            region: self.region_of(path)?,
            aggregate_count: count,
            extrude_height: count as f64 * self.config.density_scale,
            links,
            points,
        })
    }

    /// Render and store one node's document, honouring the rebuild policy.
    pub fn write<B: StorageBackend + ?Sized>(
        &self,
        path: &NodePath,
        backend: &mut B,
    ) -> Result<WriteOutcome> {
        if self.config.rebuild_policy == RebuildPolicy::SkipExisting
            && backend.read_document(path)?.is_some()
        {
            return Ok(WriteOutcome::SkippedExisting);
        }

        let document = self.render(path)?;
        if self.config.rebuild_policy == RebuildPolicy::SkipClean
            && let Some(existing) = backend.read_document(path)?
            && kml::read_baked_state(&existing) == Some(document.baked_state())
        {
            return Ok(WriteOutcome::SkippedClean);
        }

        backend.write_document(path, &kml::to_kml(&document)?)?;
        Ok(WriteOutcome::Written)
    }

    /// Write documents for the whole tree.
    ///
    /// A node that fails is reported and its descendants are left alone;
    /// the rest of the tree is still generated.
    pub fn generate<B: StorageBackend + ?Sized>(&self, backend: &mut B) -> GenerationReport {
        let mut report = GenerationReport::default();
        let mut failed: FxHashSet<NodePath> = FxHashSet::default();

        for node in TreeWalker::new(self.index).pre_order() {
            let path = node.path();
            if has_failed_ancestor(path, &failed) {
                report.suppressed += 1;
                continue;
            }

            match self.write(path, backend) {
                Ok(WriteOutcome::Written) => report.written += 1,
                Ok(WriteOutcome::SkippedClean) => report.skipped_clean += 1,
                Ok(WriteOutcome::SkippedExisting) => report.skipped_existing += 1,
                Err(e) => {
                    log::warn!("Document for {} failed, skipping its subtree: {}", path, e);
                    report.failed.push((path.clone(), e.to_string()));
                    failed.insert(path.clone());
                }
            }
        }

        if report.skipped_existing > 0 {
            log::warn!(
                "{} existing documents kept without a staleness check",
                report.skipped_existing
            );
        }
        log::info!(
            "Documents: {} written, {} unchanged, {} failed, {} not attempted",
            report.written,
            report.skipped_clean,
            report.failed.len(),
            report.suppressed
        );
        report
    }

    fn display_name(&self, path: &NodePath) -> String {
        match path.depth() {
            0 => "All countries".to_string(),
            1 => self.context.display_name(path.country().unwrap_or_default()),
            _ => path.geohash(),
        }
    }

    fn describe(&self, path: &NodePath, count: u64) -> String {
        match path.country() {
            None => format!(
                "{} places in {} countries",
                count,
                self.index.root().child_count()
            ),
            Some(code) if path.is_country() => {
                let name = self.context.display_name(code);
                format!(
                    "The country of \"{}\" (\"{}\" code) has {} places",
                    name, code, count
                )
            }
            Some(code) => format!(
                "{} places in geohash {} of {}",
                count,
                path.geohash(),
                self.context.display_name(code)
            ),
        }
    }
}

fn merge_rects(acc: Option<Rect<f64>>, rect: Rect<f64>) -> Rect<f64> {
    match acc {
        None => rect,
        Some(acc) => Rect::new(
            Coord {
                x: acc.min().x.min(rect.min().x),
                y: acc.min().y.min(rect.min().y),
            },
            Coord {
                x: acc.max().x.max(rect.max().x),
                y: acc.max().y.max(rect.max().y),
            },
        ),
    }
}

fn has_failed_ancestor(path: &NodePath, failed: &FxHashSet<NodePath>) -> bool {
    if failed.is_empty() {
        return false;
    }
    let mut current = path.parent();
    while let Some(ancestor) = current {
        if failed.contains(&ancestor) {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationPass;
    use crate::config::SegmentLayout;
    use crate::country::CountryTable;
    use crate::coverage::RegionGeometryAccumulator;
    use crate::storage::MemoryBackend;
    use crate::storage::test_support::FailingDocuments;

    struct Fixture {
        index: SpatialBucketIndex,
        counts: AggregateCounts,
        context: SpatialIndexContext,
        config: Config,
    }

    fn fixture<B: StorageBackend>(lines: &[&str], backend: &mut B, config: Config) -> Fixture {
        let mut index = SpatialBucketIndex::new(SegmentLayout::default());
        index.ingest(lines.iter().copied(), backend).unwrap();
        let (counts, _) = AggregationPass::new(&index).run(backend).unwrap();
        let mut context = SpatialIndexContext::new(CountryTable::parse("IRL Ireland\n"));
        RegionGeometryAccumulator::new(&config)
            .unwrap()
            .accumulate(&index, &counts, &mut context)
            .unwrap();
        Fixture {
            index,
            counts,
            context,
            config,
        }
    }

    impl Fixture {
        fn builder(&self) -> DocumentBuilder<'_> {
            DocumentBuilder::new(&self.index, &self.counts, &self.context, &self.config)
        }
    }

    const LINES: &[&str] = &["IRLezjmd-a1", "IRLezjmd-a2", "IRLezk-a3", "FRAu09tv-b1"];

    #[test]
    fn test_root_links_every_country() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, Config::default());
        let root = fx.builder().render(&NodePath::root())?;

        let targets: Vec<String> = root.links.iter().map(|l| l.target.to_string()).collect();
        assert_eq!(targets, vec!["FRA", "IRL"]);
        assert_eq!(root.links[0].href, "FRA/index.kml");
        assert_eq!(root.links[0].name, "country #FRA");
        assert_eq!(root.links[1].name, "Ireland");
        assert_eq!(root.aggregate_count, 4);
        assert_eq!(root.links[0].lod, LodRange::default());
        Ok(())
    }

    #[test]
    fn test_country_document() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, Config::default());
        let irl = fx.builder().render(&NodePath::from_segments(["IRL"]))?;

        assert_eq!(irl.name, "Ireland");
        assert_eq!(
            irl.description,
            "The country of \"Ireland\" (\"IRL\" code) has 3 places"
        );
        assert_eq!(irl.extrude_height, 1500.0);
        assert_eq!(irl.links.len(), 2);
        assert_eq!(irl.links[0].region, cell_bounds("ezj")?);

        let coverage = fx.context.coverage("IRL").unwrap().bounding_rect();
        assert_eq!(irl.region, Some(coverage));
        Ok(())
    }

    #[test]
    fn test_leaf_document_lists_points() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, Config::default());
        let leaf = fx
            .builder()
            .render(&NodePath::from_segments(["IRL", "ezj", "m", "d"]))?;

        assert!(leaf.links.is_empty());
        assert_eq!(leaf.points.len(), 2);
        let cell = cell_bounds("ezjmd")?;
        let p = leaf.points[0].position;
        assert!(p.x > cell.min().x && p.x < cell.max().x);
        assert!(p.y > cell.min().y && p.y < cell.max().y);
        assert_eq!(leaf.region, Some(cell));
        Ok(())
    }

    #[test]
    fn test_skip_clean_regenerates_stale_ancestors() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, Config::default());
        let first = fx.builder().generate(&mut backend);
        assert_eq!(first.written, fx.index.len() + 1);

        let again = fx.builder().generate(&mut backend);
        assert_eq!(again.written, 0);
        assert_eq!(again.skipped_clean, fx.index.len() + 1);

        // a new point below IRL/ezj: its ancestors are stale, FRA is not
        let mut more = LINES.to_vec();
        more.push("IRLezjmd-a9");
        let fx = fixture(&more, &mut backend, Config::default());
        let report = fx.builder().generate(&mut backend);
        assert_eq!(report.written, 5); // root, IRL, ezj, m, d
        assert_eq!(report.skipped_clean, fx.index.len() + 1 - 5);
        Ok(())
    }

    #[test]
    fn test_skip_existing_keeps_stale_documents() -> Result<()> {
        let config = Config::default().with_rebuild_policy(RebuildPolicy::SkipExisting);
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, config.clone());
        fx.builder().generate(&mut backend);

        let mut more = LINES.to_vec();
        more.push("IRLezjmd-a9");
        let fx = fixture(&more, &mut backend, config);
        let report = fx.builder().generate(&mut backend);
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped_existing, fx.index.len() + 1);
        Ok(())
    }

    #[test]
    fn test_skip_clean_follows_config_changes() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, Config::default());
        fx.builder().generate(&mut backend);
        let everything = fx.index.len() + 1;

        let config = Config::default().with_density_scale(10.0);
        let fx = fixture(LINES, &mut backend, config.clone());
        let report = fx.builder().generate(&mut backend);
        assert_eq!(report.written, everything);

        let leaf = NodePath::from_segments(["IRL", "ezj", "m", "d"]);
        let text = backend.read_document(&leaf)?.unwrap();
        assert_eq!(
            kml::read_baked_state(&text),
            Some(fx.builder().render(&leaf)?.baked_state())
        );

        // only link-bearing documents change with the LOD range
        let lod = LodRange {
            min_pixels: 512,
            max_pixels: -1,
        };
        let fx = fixture(LINES, &mut backend, config.with_lod(lod));
        let report = fx.builder().generate(&mut backend);
        let leaves = fx.index.nodes().filter(|n| n.child_count() == 0).count();
        assert_eq!(report.written, everything - leaves);
        assert_eq!(report.skipped_clean, leaves);
        Ok(())
    }

    #[test]
    fn test_fingerprint_tracks_rendered_content() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, Config::default());
        let irl = fx.builder().render(&NodePath::from_segments(["IRL"]))?;

        let mut renamed = irl.clone();
        renamed.name = "Éire".to_string();
        assert_ne!(irl.fingerprint(), renamed.fingerprint());

        let mut taller = irl.clone();
        taller.extrude_height += 1.0;
        assert_ne!(irl.fingerprint(), taller.fingerprint());

        assert_eq!(irl.fingerprint(), irl.clone().fingerprint());
        Ok(())
    }

    #[test]
    fn test_skip_existing_checks_before_rendering() -> Result<()> {
        let config = Config::default().with_rebuild_policy(RebuildPolicy::SkipExisting);
        let mut backend = MemoryBackend::new();
        let fx = fixture(LINES, &mut backend, config);
        let root = NodePath::root();
        backend.write_document(&root, "<kml/>")?;

        let builder = fx.builder();
        assert_eq!(builder.write(&root, &mut backend)?, WriteOutcome::SkippedExisting);
        assert_eq!(backend.read_document(&root)?.as_deref(), Some("<kml/>"));

        // an unknown node is only an error once it has to be rendered
        let unknown = NodePath::from_segments(["DEU"]);
        assert!(builder.write(&unknown, &mut backend).is_err());
        Ok(())
    }

    #[test]
    fn test_failed_write_only_affects_subtree() {
        let failing = NodePath::from_segments(["IRL", "ezj"]);
        let mut backend = FailingDocuments::new([failing.clone()]);
        let fx = fixture(LINES, &mut backend, Config::default());
        let report = fx.builder().generate(&mut backend);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, failing);
        assert_eq!(report.suppressed, 2); // IRL/ezj/m and IRL/ezj/m/d
        assert!(!report.is_complete());

        let inner = &backend.inner;
        assert!(inner.read_document(&NodePath::from_segments(["IRL", "ezk"])).unwrap().is_some());
        assert!(inner.read_document(&NodePath::from_segments(["FRA", "u09", "t", "v"])).unwrap().is_some());
        assert!(inner.read_document(&NodePath::from_segments(["IRL", "ezj", "m"])).unwrap().is_none());
    }

    #[test]
    fn test_empty_tree_root() -> Result<()> {
        let mut backend = MemoryBackend::new();
        let fx = fixture(&[], &mut backend, Config::default());
        let root = fx.builder().render(&NodePath::root())?;
        assert!(root.region.is_none());
        assert!(root.links.is_empty());
        assert_eq!(root.description, "0 places in 0 countries");
        Ok(())
    }
}
