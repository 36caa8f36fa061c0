//! Configuration for pyramid builds.
//!
//! Every knob is serializable so a build can be described in JSON (or TOML
//! with the `toml` feature) and reproduced later.
use crate::error::{GeoLodError, Result};
use serde::{Deserialize, Serialize};

/// Maximum geohash length the `geohash` crate can decode.
pub const MAX_GEOHASH_LEN: usize = 12;

/// How an identifier's `country + geohash` is split into tree segments.
///
/// With the defaults, `IRLezjmd` becomes `IRL / ezj / m / d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentLayout {
    #[serde(default = "SegmentLayout::default_country_width")]
    pub country_width: usize,

    /// Width of the first geohash segment directly below a country.
    #[serde(default = "SegmentLayout::default_first_geohash_width")]
    pub first_geohash_width: usize,

    /// Geohash characters beyond this length are not split into further levels.
    #[serde(default = "SegmentLayout::default_max_geohash_len")]
    pub max_geohash_len: usize,
}

impl SegmentLayout {
    const fn default_country_width() -> usize {
        3
    }

    const fn default_first_geohash_width() -> usize {
        3
    }

    const fn default_max_geohash_len() -> usize {
        MAX_GEOHASH_LEN
    }

    /// Number of geohash characters encoded by a node at `depth`
    /// (root = 0, country = 1).
    pub fn geohash_len_at_depth(&self, depth: usize) -> usize {
        match depth {
            0 | 1 => 0,
            d => self.first_geohash_width + (d - 2),
        }
    }

    /// Depth at which a node encodes exactly `geohash_len` characters, if any.
    pub fn depth_for_geohash_len(&self, geohash_len: usize) -> Option<usize> {
        if geohash_len < self.first_geohash_width || geohash_len > self.max_geohash_len {
            return None;
        }
        Some(2 + geohash_len - self.first_geohash_width)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.country_width == 0 {
            return Err("Country code width must be greater than zero".to_string());
        }
        if self.first_geohash_width == 0 {
            return Err("First geohash segment width must be greater than zero".to_string());
        }
        if self.max_geohash_len > MAX_GEOHASH_LEN {
            return Err(format!(
                "Maximum geohash length must be at most {}",
                MAX_GEOHASH_LEN
            ));
        }
        if self.max_geohash_len < self.first_geohash_width {
            return Err(
                "Maximum geohash length must not be shorter than the first segment".to_string(),
            );
        }
        Ok(())
    }
}

impl Default for SegmentLayout {
    fn default() -> Self {
        Self {
            country_width: Self::default_country_width(),
            first_geohash_width: Self::default_first_geohash_width(),
            max_geohash_len: Self::default_max_geohash_len(),
        }
    }
}

/// Level-of-detail pixel range gating when a viewer fetches a linked region.
///
/// `max_pixels == -1` means unbounded, as in KML's `<Lod>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodRange {
    pub min_pixels: i32,
    pub max_pixels: i32,
}

impl LodRange {
    pub const fn new(min_pixels: i32, max_pixels: i32) -> Self {
        Self {
            min_pixels,
            max_pixels,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_pixels < 0
    }
}

impl Default for LodRange {
    fn default() -> Self {
        Self::new(128, -1)
    }
}

/// What to do when a node's document already exists from an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RebuildPolicy {
    /// Regenerate every document.
    Always,
    /// Skip a document only when its embedded aggregate count and link
    /// count match the current tree.
    #[default]
    SkipClean,
    /// Skip any existing document. Ancestors of newly added points keep
    /// stale content under this policy.
    SkipExisting,
}

/// Build configuration
///
/// # Example
///
/// ```rust
/// use geolod::Config;
///
/// let json = r#"{
///     "coverage_resolution": 4,
///     "density_scale": 250.0,
///     "rebuild_policy": "always"
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.coverage_resolution, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub layout: SegmentLayout,

    /// Geohash length of the cells unioned into each country's coverage.
    #[serde(default = "Config::default_coverage_resolution")]
    pub coverage_resolution: usize,

    /// Skip union for cells already inside the running coverage.
    #[serde(default = "Config::default_prune_covered_cells")]
    pub prune_covered_cells: bool,

    /// Extrusion height per point in a region's outline.
    #[serde(default = "Config::default_density_scale")]
    pub density_scale: f64,

    #[serde(default)]
    pub lod: LodRange,

    #[serde(default)]
    pub rebuild_policy: RebuildPolicy,

    /// File name of the document stored at every node.
    #[serde(default = "Config::default_document_name")]
    pub document_name: String,

    /// File name of the per-node aggregate counter.
    #[serde(default = "Config::default_counter_name")]
    pub counter_name: String,
}

impl Config {
    const fn default_coverage_resolution() -> usize {
        3
    }

    const fn default_prune_covered_cells() -> bool {
        true
    }

    const fn default_density_scale() -> f64 {
        500.0
    }

    fn default_document_name() -> String {
        "index.kml".to_string()
    }

    fn default_counter_name() -> String {
        ".count".to_string()
    }

    pub fn with_layout(mut self, layout: SegmentLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_coverage_resolution(mut self, resolution: usize) -> Self {
        self.coverage_resolution = resolution;
        self
    }

    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune_covered_cells = prune;
        self
    }

    pub fn with_density_scale(mut self, scale: f64) -> Self {
        self.density_scale = scale;
        self
    }

    pub fn with_lod(mut self, lod: LodRange) -> Self {
        self.lod = lod;
        self
    }

    pub fn with_rebuild_policy(mut self, policy: RebuildPolicy) -> Self {
        self.rebuild_policy = policy;
        self
    }

    /// Tree depth of the nodes that feed coverage accumulation.
    pub fn coverage_depth(&self) -> Option<usize> {
        self.layout.depth_for_geohash_len(self.coverage_resolution)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.layout.validate().map_err(GeoLodError::InvalidConfig)?;

        if self.coverage_depth().is_none() {
            return Err(GeoLodError::InvalidConfig(format!(
                "Coverage resolution {} is not a tree level (must be between {} and {})",
                self.coverage_resolution,
                self.layout.first_geohash_width,
                self.layout.max_geohash_len
            )));
        }

        if !self.density_scale.is_finite() || self.density_scale < 0.0 {
            return Err(GeoLodError::InvalidConfig(
                "Density scale must be finite and non-negative".to_string(),
            ));
        }

        if self.lod.min_pixels < 0
            || (!self.lod.is_unbounded() && self.lod.max_pixels < self.lod.min_pixels)
        {
            return Err(GeoLodError::InvalidConfig(format!(
                "Invalid LOD range [{}, {}]",
                self.lod.min_pixels, self.lod.max_pixels
            )));
        }

        for (what, name) in [
            ("Document", &self.document_name),
            ("Counter", &self.counter_name),
        ] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(GeoLodError::InvalidConfig(format!(
                    "{} name '{}' must be a plain file name",
                    what, name
                )));
            }
        }
        if self.document_name == self.counter_name {
            return Err(GeoLodError::InvalidConfig(
                "Document and counter names must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| GeoLodError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GeoLodError::Serialization(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: SegmentLayout::default(),
            coverage_resolution: Self::default_coverage_resolution(),
            prune_covered_cells: Self::default_prune_covered_cells(),
            density_scale: Self::default_density_scale(),
            lod: LodRange::default(),
            rebuild_policy: RebuildPolicy::default(),
            document_name: Self::default_document_name(),
            counter_name: Self::default_counter_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coverage_depth(), Some(2));
    }

    #[test]
    fn test_layout_depths() {
        let layout = SegmentLayout::default();
        assert_eq!(layout.geohash_len_at_depth(0), 0);
        assert_eq!(layout.geohash_len_at_depth(1), 0);
        assert_eq!(layout.geohash_len_at_depth(2), 3);
        assert_eq!(layout.geohash_len_at_depth(4), 5);
        assert_eq!(layout.depth_for_geohash_len(5), Some(4));
        assert_eq!(layout.depth_for_geohash_len(2), None);
        assert_eq!(layout.depth_for_geohash_len(13), None);
    }

    #[test]
    fn test_unreachable_coverage_resolution_rejected() {
        let config = Config::default().with_coverage_resolution(2);
        assert!(matches!(
            config.validate(),
            Err(GeoLodError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_with_defaults() {
        let config = Config::from_json(r#"{"rebuild_policy": "skip_existing"}"#).unwrap();
        assert_eq!(config.rebuild_policy, RebuildPolicy::SkipExisting);
        assert_eq!(config.document_name, "index.kml");

        let json = config.to_json().unwrap();
        let back = Config::from_json(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_lod_rejected() {
        let config = Config::default().with_lod(LodRange::new(256, 64));
        assert!(config.validate().is_err());
        let config = Config::default().with_lod(LodRange::new(64, -1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_file_names_rejected() {
        let mut config = Config::default();
        config.counter_name = "index.kml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.document_name = "a/b.kml".to_string();
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default().with_density_scale(10.0);
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
