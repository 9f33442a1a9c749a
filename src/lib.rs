//! Starterkits - country-level geospatial starter kits for electrification planning.
//!
//! # Overview
//!
//! For an ISO 3166-1 alpha-3 country code, fetch the public datasets an
//! electrification study starts from and store them under a fixed layout:
//!
//! ```text
//! Data/<ISO3>/<Folder>/<ISO3>_<suffix>.<ext>
//! ```
//!
//! Datasets: model specs, administrative boundaries, population, power
//! lines, wind speed, solar irradiation, elevation, nighttime lights and
//! drivable roads. Rasters can be masked to a boundary or merged, and
//! archives unzipped.
//!
//! # Modules
//!
//! - [`model`]: Dataset kinds, parameters, fetch outcomes and batch reports
//! - [`country`]: ISO3 resolution and bounding boxes
//! - [`layout`]: On-disk paths for each dataset
//! - [`config`]: Data root, provider endpoints and credentials
//! - [`data_sources`]: Provider clients
//! - [`fetcher`]: One operation per dataset plus the batch driver
//! - [`roads`]: Road edges and class filtering
//! - [`gpkg`]: GeoPackage vector files
//! - [`raster`]: Single-band GeoTIFF rasters
//! - [`postprocess`]: Masking, merging and unzipping

pub mod config;
pub mod country;
pub mod data_sources;
pub mod error;
pub mod fetcher;
pub mod gpkg;
pub mod layout;
pub mod model;
pub mod postprocess;
pub mod raster;
pub mod roads;

pub use config::Config;
pub use country::{BoundingBox, Country, resolve_country, resolve_country_name};
pub use error::{Result, StarterKitError};
pub use fetcher::Fetcher;
pub use model::{BatchReport, DatasetKind, FetchOutcome};
