//! Level-of-detail KML pyramids from geohash-tagged place identifiers.
//!
//! Identifiers of the form `{country}{geohash}-{id}` are bucketed into a
//! prefix tree, counted bottom-up with a persisted per-node cache, merged
//! into a coverage polygon per country and written out as one KML document
//! per node whose child links only load once they cover enough pixels.
//!
//! ```rust
//! use geolod::prelude::*;
//!
//! let mut pyramid = PyramidBuilder::new()
//!     .countries(CountryTable::parse("IRL Ireland\nFRA France\n"))
//!     .build()?;
//! let summary = pyramid.build(["IRLezjmd-a1", "IRLezjmd-a2", "FRAu09tv-b1"])?;
//!
//! assert_eq!(summary.ingest.inserted, 3);
//! assert_eq!(pyramid.counts().get(&NodePath::from_segments(["IRL"])), 2);
//!
//! let root = pyramid.render(&NodePath::root())?;
//! assert_eq!(root.links.len(), 2);
//! # Ok::<(), geolod::GeoLodError>(())
//! ```

pub mod aggregate;
pub mod builder;
pub mod config;
pub mod context;
pub mod country;
pub mod coverage;
pub mod document;
pub mod error;
pub mod index;
pub mod kml;
pub mod pyramid;
pub mod record;
pub mod storage;
pub mod types;
pub mod walker;

pub use aggregate::{AggregateCounts, AggregationPass, AggregationReport};
pub use builder::{DynBackend, PyramidBuilder};
pub use config::{Config, LodRange, RebuildPolicy, SegmentLayout};
pub use context::{CountryAggregate, SpatialIndexContext};
pub use country::CountryTable;
pub use coverage::{CoverageGeometry, CoverageReport, RegionGeometryAccumulator, cell_bounds};
pub use document::{
    BakedState, DocumentBuilder, GenerationReport, LinkDescriptor, OutputDocument, PointMark,
};
pub use error::{GeoLodError, Result};
pub use index::{IngestReport, InsertOutcome, SpatialBucketIndex};
pub use pyramid::{BuildSummary, Pyramid};
pub use record::{PlaceRecord, RecordParser};
pub use storage::{FsBackend, MemoryBackend, StorageBackend, StorageStats};
pub use types::{BucketNode, NodeCreation, NodePath};
pub use walker::TreeWalker;

pub use geo::{Coord, MultiPolygon, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoLodError, PyramidBuilder, Result};

    pub use crate::{Config, CountryTable, LodRange, RebuildPolicy, SegmentLayout};

    pub use crate::{NodePath, Pyramid};

    pub use crate::{FsBackend, MemoryBackend, StorageBackend};

    pub use geo::Rect;
}
