//! Country code to display name lookup.
//!
//! The reference file has one `CODE Display Name` entry per line, e.g.
//! `IRL Ireland`. Unknown codes resolve to a placeholder instead of failing.

use crate::error::{GeoLodError, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryTable {
    names: BTreeMap<String, String>,
}

impl CountryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse table text. Blank lines are ignored, lines without a name are
    /// logged and skipped.
    ///
    /// ```
    /// use geolod::CountryTable;
    ///
    /// let table = CountryTable::parse("IRL Ireland\nFRA France\n");
    /// assert_eq!(table.name("IRL"), "Ireland");
    /// assert_eq!(table.name("XYZ"), "country #XYZ");
    /// ```
    pub fn parse(text: &str) -> Self {
        let mut table = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(' ') {
                Some((code, name)) if !code.is_empty() && !name.trim().is_empty() => {
                    table.insert(code, name.trim());
                }
                _ => log::warn!("Skipping country table line {}: '{}'", lineno + 1, line),
            }
        }
        table
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GeoLodError::storage(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn insert(&mut self, code: &str, name: &str) {
        self.names.insert(code.to_string(), name.to_string());
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    /// Display name, or `country #<code>` on a lookup miss.
    pub fn name(&self, code: &str) -> Cow<'_, str> {
        match self.get(code) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("country #{}", code)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(code, name)| (code.as_str(), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_word_names() {
        let table = CountryTable::parse("724 Spain\nGBR United Kingdom of Great Britain\r\n\n");
        assert_eq!(table.len(), 2);
        assert_eq!(table.name("724"), "Spain");
        assert_eq!(table.name("GBR"), "United Kingdom of Great Britain");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let table = CountryTable::parse("IRL\nFRA France\n   \n");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("IRL"), None);
        assert_eq!(table.name("IRL"), "country #IRL");
    }

    #[test]
    fn test_from_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "DEU Germany\n").unwrap();
        let table = CountryTable::from_path(file.path()).unwrap();
        assert_eq!(table.name("DEU"), "Germany");

        assert!(CountryTable::from_path(file.path().join("missing")).is_err());
    }
}
