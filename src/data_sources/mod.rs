//! Clients for the public geospatial data providers.
//!
//! # Data Sources
//!
//! - [`http`]: streaming file downloads shared by every file-based provider
//! - [`catalog`]: download URLs for specs, WorldPop, Zenodo, wind, solar and DEM files
//! - [`gadm`]: GADM national boundaries (GeoJSON)
//! - [`overpass`]: OpenStreetMap drivable road network via the Overpass API

pub mod catalog;
pub mod gadm;
pub mod http;
pub mod overpass;

pub use catalog::SourceCatalog;
pub use gadm::GadmClient;
pub use http::Downloader;
pub use overpass::OverpassClient;
