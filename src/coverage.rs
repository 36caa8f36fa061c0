//! Per-country coverage polygons.
//!
//! Each country's coverage is the union of the bounding boxes of its
//! populated geohash cells at one configured resolution. Cells already
//! inside the running union are skipped: first by a bounding-rectangle
//! test, then by an exact containment test. In clustered data most cells
//! end up skipped, so only a small share of cells pay for a polygon union.

use crate::aggregate::AggregateCounts;
use crate::config::Config;
use crate::context::SpatialIndexContext;
use crate::error::{GeoLodError, Result};
use crate::index::SpatialBucketIndex;
use crate::walker::TreeWalker;
use geo::{Area, BooleanOps, BoundingRect, Contains, MultiPolygon, Polygon, Rect};
use geojson::{Geometry, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Bounding rectangle of a geohash cell.
pub fn cell_bounds(geohash: &str) -> Result<Rect<f64>> {
    geohash::decode_bbox(geohash).map_err(|_| GeoLodError::InvalidGeohash(geohash.to_string()))
}

/// Running union of a country's populated cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageGeometry {
    shape: MultiPolygon<f64>,
    bounds: Rect<f64>,
    cells: usize,
}

impl CoverageGeometry {
    fn seed(cell: Rect<f64>) -> Self {
        Self {
            shape: MultiPolygon::new(vec![cell.to_polygon()]),
            bounds: cell,
            cells: 1,
        }
    }

    /// Whether `cell` adds nothing to the coverage.
    fn covers(&self, cell: &Rect<f64>) -> bool {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let inside_bounds = cell.min().x >= min.x
            && cell.min().y >= min.y
            && cell.max().x <= max.x
            && cell.max().y <= max.y;
        inside_bounds && self.shape.contains(&cell.to_polygon())
    }

    fn extend(&mut self, cell: Rect<f64>) {
        let cell: Polygon<f64> = cell.to_polygon();
        self.shape = self.shape.union(&cell);
        if let Some(bounds) = self.shape.bounding_rect() {
            self.bounds = bounds;
        }
        self.cells += 1;
    }

    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    /// Bounding box of the union; this is what document regions use.
    pub fn bounding_rect(&self) -> Rect<f64> {
        self.bounds
    }

    /// Area in square degrees.
    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    /// Number of cells that seeded or extended the union.
    pub fn contributing_cells(&self) -> usize {
        self.cells
    }

    pub fn to_geojson(&self) -> Result<String> {
        let polygons = self
            .shape
            .iter()
            .map(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect::<Vec<_>>())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let geometry = Geometry::new(Value::MultiPolygon(polygons));
        serde_json::to_string(&geometry).map_err(|e| {
            GeoLodError::Serialization(format!("Failed to serialize coverage: {}", e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    Seeded,
    Pruned,
    Extended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub countries: usize,
    pub cells: usize,
    pub pruned: usize,
    pub unions: usize,
}

impl CoverageReport {
    fn merge(&mut self, other: &CoverageReport) {
        self.countries += other.countries;
        self.cells += other.cells;
        self.pruned += other.pruned;
        self.unions += other.unions;
    }
}

/// Builds coverage geometry; the only writer of coverage in a
/// [`SpatialIndexContext`].
#[derive(Debug, Clone, Copy)]
pub struct RegionGeometryAccumulator {
    depth: usize,
    prune: bool,
}

impl RegionGeometryAccumulator {
    pub fn new(config: &Config) -> Result<Self> {
        let depth = config.coverage_depth().ok_or_else(|| {
            GeoLodError::InvalidConfig(format!(
                "Coverage resolution {} is not a tree level",
                config.coverage_resolution
            ))
        })?;
        Ok(Self {
            depth,
            prune: config.prune_covered_cells,
        })
    }

    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Fold one cell into a running union.
    pub fn add_cell(
        &self,
        coverage: &mut Option<CoverageGeometry>,
        geohash: &str,
    ) -> Result<CellOutcome> {
        let cell = cell_bounds(geohash)?;
        match coverage.as_mut() {
            None => {
                *coverage = Some(CoverageGeometry::seed(cell));
                Ok(CellOutcome::Seeded)
            }
            Some(running) => {
                if self.prune && running.covers(&cell) {
                    log::trace!("Cell {} already covered", geohash);
                    return Ok(CellOutcome::Pruned);
                }
                running.extend(cell);
                Ok(CellOutcome::Extended)
            }
        }
    }

    /// Union a set of cells in the given order.
    pub fn union_cells<I, S>(&self, cells: I) -> Result<(Option<CoverageGeometry>, CoverageReport)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut coverage = None;
        let mut report = CoverageReport::default();
        for cell in cells {
            report.cells += 1;
            match self.add_cell(&mut coverage, cell.as_ref())? {
                CellOutcome::Seeded => {}
                CellOutcome::Pruned => report.pruned += 1,
                CellOutcome::Extended => report.unions += 1,
            }
        }
        if coverage.is_some() {
            report.countries = 1;
        }
        Ok((coverage, report))
    }

    /// Populated cells at the coverage resolution, grouped by country code.
    pub fn populated_cells(
        &self,
        index: &SpatialBucketIndex,
        counts: &AggregateCounts,
    ) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in TreeWalker::new(index).post_order() {
            if node.level() != self.depth || counts.get(node.path()) == 0 {
                continue;
            }
            if let Some(country) = node.path().country() {
                groups
                    .entry(country.to_string())
                    .or_default()
                    .push(node.path().geohash());
            }
        }
        groups
    }

    /// Recompute every country's coverage into the context.
    pub fn accumulate(
        &self,
        index: &SpatialBucketIndex,
        counts: &AggregateCounts,
        context: &mut SpatialIndexContext,
    ) -> Result<CoverageReport> {
        let mut report = CoverageReport::default();
        let mut coverage = BTreeMap::new();

        for (country, cells) in self.populated_cells(index, counts) {
            let (geometry, country_report) = self.union_cells(&cells)?;
            report.merge(&country_report);
            if let Some(geometry) = geometry {
                coverage.insert(country, geometry);
            }
        }

        context.replace_coverage(coverage);
        log_report(&report);
        Ok(report)
    }

    /// Like [`accumulate`](Self::accumulate) with countries spread over
    /// `workers` threads. A country's running union is only ever touched by
    /// the worker that owns it.
    pub fn accumulate_parallel(
        &self,
        index: &SpatialBucketIndex,
        counts: &AggregateCounts,
        context: &mut SpatialIndexContext,
        workers: usize,
    ) -> Result<CoverageReport> {
        let groups: Vec<(String, Vec<String>)> =
            self.populated_cells(index, counts).into_iter().collect();
        let chunk_size = groups.len().div_ceil(workers.max(1)).max(1);

        let results = Mutex::new((BTreeMap::new(), CoverageReport::default()));
        let failure: Mutex<Option<GeoLodError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for chunk in groups.chunks(chunk_size) {
                let (results, failure) = (&results, &failure);
                scope.spawn(move || {
                    for (country, cells) in chunk {
                        match self.union_cells(cells) {
                            Ok((geometry, country_report)) => {
                                let mut guard = results.lock();
                                guard.1.merge(&country_report);
                                if let Some(geometry) = geometry {
                                    guard.0.insert(country.clone(), geometry);
                                }
                            }
                            Err(e) => {
                                failure.lock().get_or_insert(e);
                                return;
                            }
                        }
                    }
                });
            }
        });

        if let Some(e) = failure.into_inner() {
            return Err(e);
        }
        let (coverage, report) = results.into_inner();
        context.replace_coverage(coverage);
        log_report(&report);
        Ok(report)
    }
}

fn log_report(report: &CoverageReport) {
    log::info!(
        "Coverage for {} countries from {} cells: {} pruned, {} unions",
        report.countries,
        report.cells,
        report.pruned,
        report.unions
    );
}
