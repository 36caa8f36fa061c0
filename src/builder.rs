//! Pyramid builder for flexible configuration
//!
//! Chooses the storage backend and loads the country table before the
//! pyramid is opened.

use crate::config::Config;
use crate::country::CountryTable;
use crate::error::Result;
use crate::pyramid::Pyramid;
use crate::storage::{FsBackend, MemoryBackend, StorageBackend};
use std::path::PathBuf;

/// Backend chosen at runtime by [`PyramidBuilder`].
pub type DynBackend = Box<dyn StorageBackend>;

/// Builder for pyramids with an output directory, country table and settings.
#[derive(Debug)]
pub struct PyramidBuilder {
    output_dir: Option<PathBuf>,
    country_file: Option<PathBuf>,
    countries: CountryTable,
    config: Config,
    in_memory: bool,
}

impl PyramidBuilder {
    /// Create a new builder with default in-memory configuration.
    pub fn new() -> Self {
        Self {
            output_dir: None,
            country_file: None,
            countries: CountryTable::new(),
            config: Config::default(),
            in_memory: true,
        }
    }

    /// Write the tree under `dir`. An existing tree there is reopened and extended.
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self.in_memory = false;
        self
    }

    /// Keep the whole tree in memory with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self.output_dir = None;
        self
    }

    /// Read country names from a `CODE Name` file when building.
    pub fn country_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.country_file = Some(path.into());
        self
    }

    /// Use an already loaded country table. A country file, if set, is merged over it.
    pub fn countries(mut self, countries: CountryTable) -> Self {
        self.countries = countries;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Pyramid<DynBackend>> {
        let mut countries = self.countries;
        if let Some(path) = &self.country_file {
            let loaded = CountryTable::from_path(path)?;
            log::info!("Loaded {} country names from {}", loaded.len(), path.display());
            for (code, name) in loaded.iter() {
                countries.insert(code, name);
            }
        }

        let backend: DynBackend = match (&self.output_dir, self.in_memory) {
            (Some(dir), false) => Box::new(FsBackend::open_with_config(dir, &self.config)?),
            _ => Box::new(MemoryBackend::new()),
        };

        Pyramid::open(self.config, countries, backend)
    }
}

impl Default for PyramidBuilder {
    fn default() -> Self {
        Self::new()
    }
}
