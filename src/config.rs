//! Runtime configuration: data root, provider endpoints and credentials.

use std::env;
use std::path::PathBuf;

/// Default data root, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "Data";

/// Public demo key published by OpenTopography; heavily rate limited.
pub const OPENTOPOGRAPHY_DEMO_KEY: &str = "demoapikeyot2022";

const SPECS_BASE: &str = "https://geospatialsdk.s3.amazonaws.com";
const WORLDPOP_BASE: &str = "https://data.worldpop.org";
const POWER_LINES_URL: &str = "https://zenodo.org/records/3628142/files/grid.gpkg";
const WIND_ATLAS_BASE: &str = "https://globalwindatlas.info";
const SOLAR_ATLAS_BASE: &str = "https://api.globalsolaratlas.info";
const OPENTOPOGRAPHY_BASE: &str = "https://portal.opentopography.org";
const GADM_BASE: &str = "https://geodata.ucdavis.edu/gadm/gadm4.1";
const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Provider base URLs. Tests point these at a local mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub specs_base: String,
    pub worldpop_base: String,
    pub power_lines_url: String,
    pub wind_atlas_base: String,
    pub solar_atlas_base: String,
    pub opentopography_base: String,
    pub gadm_base: String,
    pub overpass_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            specs_base: SPECS_BASE.to_string(),
            worldpop_base: WORLDPOP_BASE.to_string(),
            power_lines_url: POWER_LINES_URL.to_string(),
            wind_atlas_base: WIND_ATLAS_BASE.to_string(),
            solar_atlas_base: SOLAR_ATLAS_BASE.to_string(),
            opentopography_base: OPENTOPOGRAPHY_BASE.to_string(),
            gadm_base: GADM_BASE.to_string(),
            overpass_url: OVERPASS_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Route every provider to one base URL (mock servers).
    pub fn all_at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            specs_base: base.to_string(),
            worldpop_base: base.to_string(),
            power_lines_url: format!("{base}/records/3628142/files/grid.gpkg"),
            wind_atlas_base: base.to_string(),
            solar_atlas_base: base.to_string(),
            opentopography_base: base.to_string(),
            gadm_base: base.to_string(),
            overpass_url: format!("{base}/api/interpreter"),
        }
    }
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the `<ISO3>/<Folder>/` tree.
    pub data_dir: PathBuf,

    pub endpoints: Endpoints,

    /// API key for the OpenTopography global DEM service.
    pub opentopography_key: String,

    /// Mask wind-speed and elevation rasters to the country boundary after
    /// download, when the boundary file is present.
    pub mask_to_boundary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            endpoints: Endpoints::default(),
            opentopography_key: OPENTOPOGRAPHY_DEMO_KEY.to_string(),
            mask_to_boundary: false,
        }
    }
}

impl Config {
    /// Load configuration from `STARTERKITS_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let data_dir = env::var("STARTERKITS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let opentopography_key =
            env::var("STARTERKITS_OPENTOPOGRAPHY_KEY").unwrap_or(defaults.opentopography_key);

        let mask_to_boundary = env::var("STARTERKITS_MASK_TO_BOUNDARY")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.mask_to_boundary);

        Self {
            data_dir,
            endpoints: defaults.endpoints,
            opentopography_key,
            mask_to_boundary,
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_endpoints_all_at_trims_slash() {
        let endpoints = Endpoints::all_at("http://127.0.0.1:9000/");
        assert_eq!(endpoints.gadm_base, "http://127.0.0.1:9000");
        assert_eq!(
            endpoints.power_lines_url,
            "http://127.0.0.1:9000/records/3628142/files/grid.gpkg"
        );
        assert_eq!(endpoints.overpass_url, "http://127.0.0.1:9000/api/interpreter");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("Data"));
        assert_eq!(config.opentopography_key, OPENTOPOGRAPHY_DEMO_KEY);
        assert!(!config.mask_to_boundary);
    }
}
