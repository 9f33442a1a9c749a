//! Error type shared by the fetcher and the postprocessor.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StarterKitError>;

/// Everything that can go wrong while acquiring or preparing a dataset.
#[derive(Debug, Error)]
pub enum StarterKitError {
    /// The ISO3 code does not resolve to a known country.
    #[error("unknown country code '{0}'")]
    UnknownCountry(String),

    /// The provider answered with a non-success status.
    #[error("download of {url} failed with HTTP {status}")]
    Download {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Overpass answered but aborted the query (timeout, memory limit).
    #[error("overpass query failed: {0}")]
    Overpass(String),

    /// Transport-level failure (DNS, TLS, connection reset, body decode).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A mask was requested with a geometry source that cannot be used.
    #[error("invalid geometry source: {0}")]
    InvalidGeometrySource(String),

    /// A dataset parameter is recognised but not served.
    #[error("unsupported {parameter} '{value}'")]
    UnsupportedParameter {
        parameter: &'static str,
        value: String,
    },

    /// Mask shapes do not intersect the raster extent.
    #[error("input shapes do not overlap raster {0}")]
    NoOverlap(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The raster layout is outside what this crate reads or writes.
    #[error("unsupported raster {path}: {reason}")]
    UnsupportedRaster { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("geopackage error: {0}")]
    Geopackage(#[from] sqlx::Error),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<geozero::error::GeozeroError> for StarterKitError {
    fn from(e: geozero::error::GeozeroError) -> Self {
        StarterKitError::Geometry(e.to_string())
    }
}

impl From<geojson::Error> for StarterKitError {
    fn from(e: geojson::Error) -> Self {
        StarterKitError::Geometry(e.to_string())
    }
}
