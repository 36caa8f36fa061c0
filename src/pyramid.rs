//! The full build pipeline over one storage backend.

use crate::aggregate::{AggregateCounts, AggregationPass, AggregationReport};
use crate::config::Config;
use crate::context::{CountryAggregate, SpatialIndexContext};
use crate::country::CountryTable;
use crate::coverage::{CoverageReport, RegionGeometryAccumulator};
use crate::document::{DocumentBuilder, GenerationReport, OutputDocument};
use crate::error::Result;
use crate::index::{IngestReport, SpatialBucketIndex};
use crate::storage::StorageBackend;
use crate::types::NodePath;

/// Outcome of [`Pyramid::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub ingest: IngestReport,
    pub aggregation: AggregationReport,
    pub coverage: CoverageReport,
    pub documents: GenerationReport,
}

impl BuildSummary {
    /// True when every document was written or found clean.
    pub fn is_complete(&self) -> bool {
        self.documents.is_complete()
    }
}

/// A level-of-detail document tree backed by a [`StorageBackend`].
///
/// Opening a pyramid reloads whatever tree the backend already holds, so
/// each build extends the previous one.
///
/// ```
/// use geolod::{Config, CountryTable, MemoryBackend, Pyramid};
///
/// let countries = CountryTable::parse("IRL Ireland\n");
/// let mut pyramid = Pyramid::open(Config::default(), countries, MemoryBackend::new())?;
/// let summary = pyramid.build(["IRLezjmd-a1", "IRLezjmd-a2", "bad line"])?;
///
/// assert_eq!(summary.ingest.inserted, 2);
/// assert_eq!(summary.ingest.malformed, 1);
/// assert_eq!(pyramid.counts().total(), 2);
/// # Ok::<(), geolod::GeoLodError>(())
/// ```
pub struct Pyramid<B: StorageBackend> {
    config: Config,
    backend: B,
    index: SpatialBucketIndex,
    context: SpatialIndexContext,
    counts: AggregateCounts,
}

impl<B: StorageBackend> Pyramid<B> {
    pub fn open(config: Config, countries: CountryTable, backend: B) -> Result<Self> {
        config.validate()?;
        let index = SpatialBucketIndex::load(config.layout, &backend)?;
        if !index.is_empty() {
            log::info!(
                "Reopened tree with {} nodes and {} points",
                index.len(),
                index.point_count()
            );
        }
        Ok(Self {
            config,
            backend,
            index,
            context: SpatialIndexContext::new(countries),
            counts: AggregateCounts::default(),
        })
    }

    pub fn ingest<I, S>(&mut self, lines: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.index.ingest(lines, &mut self.backend)
    }

    pub fn aggregate(&mut self) -> Result<AggregationReport> {
        let (counts, report) = AggregationPass::new(&self.index).run(&mut self.backend)?;
        self.counts = counts;
        Ok(report)
    }

    /// Recompute country coverage. Uses the counts of the last
    /// [`aggregate`](Self::aggregate).
    pub fn accumulate_coverage(&mut self) -> Result<CoverageReport> {
        RegionGeometryAccumulator::new(&self.config)?.accumulate(
            &self.index,
            &self.counts,
            &mut self.context,
        )
    }

    pub fn accumulate_coverage_parallel(&mut self, workers: usize) -> Result<CoverageReport> {
        RegionGeometryAccumulator::new(&self.config)?.accumulate_parallel(
            &self.index,
            &self.counts,
            &mut self.context,
            workers,
        )
    }

    pub fn generate_documents(&mut self) -> GenerationReport {
        DocumentBuilder::new(&self.index, &self.counts, &self.context, &self.config)
            .generate(&mut self.backend)
    }

    /// Render one node's document without storing it.
    pub fn render(&self, path: &NodePath) -> Result<OutputDocument> {
        DocumentBuilder::new(&self.index, &self.counts, &self.context, &self.config).render(path)
    }

    /// Ingest `lines` and bring counts, coverage and documents up to date.
    pub fn build<I, S>(&mut self, lines: I) -> Result<BuildSummary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ingest = self.ingest(lines)?;
        let aggregation = self.aggregate()?;
        let coverage = self.accumulate_coverage()?;
        let documents = self.generate_documents();
        self.backend.sync()?;

        Ok(BuildSummary {
            ingest,
            aggregation,
            coverage,
            documents,
        })
    }

    pub fn country_aggregates(&self) -> Vec<CountryAggregate> {
        self.index
            .countries()
            .filter_map(|node| node.path().country())
            .map(|code| self.context.country_aggregate(code, &self.counts))
            .collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &SpatialBucketIndex {
        &self.index
    }

    pub fn context(&self) -> &SpatialIndexContext {
        &self.context
    }

    pub fn counts(&self) -> &AggregateCounts {
        &self.counts
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::cell_bounds;
    use crate::storage::MemoryBackend;

    fn pyramid() -> Pyramid<MemoryBackend> {
        Pyramid::open(
            Config::default(),
            CountryTable::parse("IRL Ireland\nFRA France\n"),
            MemoryBackend::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_summary() -> Result<()> {
        let mut pyramid = pyramid();
        let summary = pyramid.build(["IRLezjmd-a1", "IRLezjmd-a2", "FRAu09tv-b1", "", "oops"])?;

        assert_eq!(summary.ingest.inserted, 3);
        assert_eq!(summary.ingest.malformed, 1);
        assert_eq!(summary.ingest.blank_lines, 1);
        assert_eq!(summary.aggregation.nodes_visited, pyramid.index().len() + 1);
        assert_eq!(summary.coverage.countries, 2);
        assert_eq!(summary.documents.written, pyramid.index().len() + 1);
        assert!(summary.is_complete());
        Ok(())
    }

    #[test]
    fn test_country_aggregates() -> Result<()> {
        let mut pyramid = pyramid();
        pyramid.build(["IRLezjmd-a1", "IRLezjmd-a2", "FRAu09tv-b1", "DEUu33d-c1"])?;

        let aggregates = pyramid.country_aggregates();
        let codes: Vec<&str> = aggregates.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["DEU", "FRA", "IRL"]);
        assert_eq!(aggregates[0].display_name, "country #DEU");
        assert_eq!(aggregates[2].display_name, "Ireland");
        assert_eq!(aggregates[2].total_points, 2);

        let fra = aggregates[1].coverage.as_ref().unwrap();
        assert_eq!(fra.bounding_rect(), cell_bounds("u09")?);
        Ok(())
    }

    #[test]
    fn test_parallel_coverage_matches_sequential() -> Result<()> {
        let mut pyramid = pyramid();
        pyramid.build(["IRLezjmd-a1", "IRLezk-a2", "FRAu09tv-b1", "FRAu0d-b2", "DEUu33d-c1"])?;
        let sequential: Vec<_> = pyramid.country_aggregates();

        let report = pyramid.accumulate_coverage_parallel(2)?;
        assert_eq!(report.countries, 3);
        for (before, after) in sequential.iter().zip(pyramid.country_aggregates()) {
            let (a, b) = (before.coverage.as_ref().unwrap(), after.coverage.unwrap());
            assert_eq!(a.bounding_rect(), b.bounding_rect());
            assert!((a.area() - b.area()).abs() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::default().with_coverage_resolution(2);
        let result = Pyramid::open(config, CountryTable::new(), MemoryBackend::new());
        assert!(result.is_err());
    }
}
