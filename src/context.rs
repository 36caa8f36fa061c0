//! Shared read context for the passes.
//!
//! Holds the country table and the per-country coverage. Coverage is only
//! replaced by [`RegionGeometryAccumulator`](crate::coverage::RegionGeometryAccumulator);
//! everything else reads it.

use crate::aggregate::AggregateCounts;
use crate::country::CountryTable;
use crate::coverage::CoverageGeometry;
use crate::types::NodePath;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SpatialIndexContext {
    countries: CountryTable,
    coverage: BTreeMap<String, CoverageGeometry>,
}

/// Everything known about one country after a build.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryAggregate {
    pub code: String,
    pub display_name: String,
    pub total_points: u64,
    pub coverage: Option<CoverageGeometry>,
}

impl SpatialIndexContext {
    pub fn new(countries: CountryTable) -> Self {
        Self {
            countries,
            coverage: BTreeMap::new(),
        }
    }

    pub fn countries(&self) -> &CountryTable {
        &self.countries
    }

    pub fn display_name(&self, code: &str) -> String {
        self.countries.name(code).into_owned()
    }

    pub fn coverage(&self, code: &str) -> Option<&CoverageGeometry> {
        self.coverage.get(code)
    }

    pub fn coverages(&self) -> impl Iterator<Item = (&str, &CoverageGeometry)> {
        self.coverage.iter().map(|(code, geometry)| (code.as_str(), geometry))
    }

    pub(crate) fn replace_coverage(&mut self, coverage: BTreeMap<String, CoverageGeometry>) {
        self.coverage = coverage;
    }

    pub fn country_aggregate(&self, code: &str, counts: &AggregateCounts) -> CountryAggregate {
        CountryAggregate {
            code: code.to_string(),
            display_name: self.display_name(code),
            total_points: counts.get(&NodePath::from_segments([code])),
            coverage: self.coverage.get(code).cloned(),
        }
    }
}
