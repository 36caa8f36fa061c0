//! Place identifier parsing.
//!
//! Identifiers look like `IRLezjmd-e400738407474eb9`: a fixed-width country
//! code, a geohash prefix of any length, a single hyphen and an opaque id.

use crate::config::SegmentLayout;
use crate::error::{GeoLodError, Result};
use std::fmt;

const GEOHASH_ALPHABET: &str = "0123456789bcdefghjkmnpqrstuvwxyz";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceRecord {
    country_code: String,
    geohash: String,
    unique_id: String,
}

impl PlaceRecord {
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn geohash(&self) -> &str {
        &self.geohash
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// The identifier as it appeared in the input, used as the member name.
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PlaceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{}", self.country_code, self.geohash, self.unique_id)
    }
}

/// Splits identifiers according to a [`SegmentLayout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser {
    layout: SegmentLayout,
}

impl RecordParser {
    pub fn new(layout: SegmentLayout) -> Self {
        Self { layout }
    }

    /// Parse one line. Trailing whitespace (including `\r\n`) is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use geolod::record::RecordParser;
    ///
    /// let parser = RecordParser::default();
    /// let record = parser.parse("IRLezjmd-a1").unwrap();
    /// assert_eq!(record.country_code(), "IRL");
    /// assert_eq!(record.geohash(), "ezjmd");
    /// assert!(parser.parse("norecord").is_err());
    /// ```
    pub fn parse(&self, line: &str) -> Result<PlaceRecord> {
        let line = line.trim_end();

        let mut parts = line.split('-');
        let (head, id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(head), Some(id), None) => (head, id),
            _ => return Err(malformed(line, "expected exactly one '-' separator")),
        };

        if id.is_empty() {
            return Err(malformed(line, "empty unique id"));
        }
        if id.contains(['/', '\\', '\0']) {
            return Err(malformed(line, "unique id must not contain path separators"));
        }
        if !head.is_ascii() {
            return Err(malformed(line, "country code and geohash must be ASCII"));
        }

        let min_len = self.layout.country_width + self.layout.first_geohash_width;
        if head.len() < min_len {
            return Err(malformed(
                line,
                &format!("expected at least {} country and geohash characters", min_len),
            ));
        }

        let (country_code, geohash) = head.split_at(self.layout.country_width);
        if !country_code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(malformed(line, "country code must be alphanumeric"));
        }
        validate_geohash(geohash)?;

        Ok(PlaceRecord {
            country_code: country_code.to_string(),
            geohash: geohash.to_string(),
            unique_id: id.to_string(),
        })
    }
}

/// Check that every character belongs to the geohash base32 alphabet.
pub fn validate_geohash(geohash: &str) -> Result<()> {
    if geohash.is_empty() || !geohash.chars().all(|c| GEOHASH_ALPHABET.contains(c)) {
        return Err(GeoLodError::InvalidGeohash(geohash.to_string()));
    }
    Ok(())
}

fn malformed(line: &str, reason: &str) -> GeoLodError {
    GeoLodError::MalformedRecord {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}
