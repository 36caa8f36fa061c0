//! Error types for geolod.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeoLodError>;

#[derive(Debug, Error)]
pub enum GeoLodError {
    /// Input line could not be split into `{country}{geohash}-{id}`.
    #[error("malformed record '{line}': {reason}")]
    MalformedRecord { line: String, reason: String },

    #[error("invalid geohash '{0}'")]
    InvalidGeohash(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage failure at a specific tree location. Never raised for
    /// "already exists", which the backends treat as success.
    #[error("storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl GeoLodError {
    pub(crate) fn storage<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        GeoLodError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only affects a single record and the batch may go on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GeoLodError::MalformedRecord { .. } | GeoLodError::InvalidGeohash(_)
        )
    }
}

impl From<serde_json::Error> for GeoLodError {
    fn from(err: serde_json::Error) -> Self {
        GeoLodError::Serialization(err.to_string())
    }
}

impl From<quick_xml::Error> for GeoLodError {
    fn from(err: quick_xml::Error) -> Self {
        GeoLodError::Serialization(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for GeoLodError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        GeoLodError::Serialization(err.to_string())
    }
}
