//! Download URLs of the raster and file providers.
//!
//! # Providers
//!
//! - OnSSET specs bucket (YAML model inputs)
//! - WorldPop: population counts and VIIRS nighttime-light covariates
//! - Zenodo record 3628142: medium-voltage grid for Africa
//! - Global Wind Atlas country GeoTIFFs
//! - Global Solar Atlas country GIS bundles (zip)
//! - OpenTopography global DEM API (NASADEM)

use crate::config::Endpoints;
use crate::country::{BoundingBox, Country};
use crate::error::{Result, StarterKitError};
use crate::model::{PopulationResolution, WindHeight};

/// Builds provider URLs from a set of endpoints.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    endpoints: Endpoints,
}

impl SourceCatalog {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    pub fn specs_url(&self, country: &Country) -> String {
        format!(
            "{}/OnSSET_specs/{}_data.yaml",
            self.endpoints.specs_base, country.iso3
        )
    }

    /// WorldPop 2023 constrained population, R2025A release.
    ///
    /// Only the 1 km UN-adjusted grid is served.
    pub fn population_url(&self, country: &Country, resolution: PopulationResolution) -> Result<String> {
        match resolution {
            PopulationResolution::OneKm => Ok(format!(
                "{}/GIS/Population/Global_2015_2030/R2025A/2023/{}/v1/1km_ua/constrained/{}_pop_2023_CN_1km_R2025A_UA_v1.tif",
                self.endpoints.worldpop_base,
                country.iso3,
                country.iso3_lower()
            )),
            PopulationResolution::HundredMetres => Err(StarterKitError::UnsupportedParameter {
                parameter: "population resolution",
                value: resolution.as_str().to_string(),
            }),
        }
    }

    pub fn power_lines_url(&self) -> &str {
        &self.endpoints.power_lines_url
    }

    pub fn wind_speed_url(&self, country: &Country, height: WindHeight) -> String {
        format!(
            "{}/api/gis/country/{}/wind-speed/{}",
            self.endpoints.wind_atlas_base, country.iso3, height
        )
    }

    /// Long-term yearly and monthly totals bundle, keyed by country name.
    pub fn solar_irradiation_url(&self, country: &Country) -> String {
        let name = urlencoding::encode(&country.name);
        format!(
            "{}/download/{name}/{name}_GISdata_LTAym_YearlyMonthlyTotals_GlobalSolarAtlas-v2_GEOTIFF.zip",
            self.endpoints.solar_atlas_base
        )
    }

    pub fn elevation_url(&self, bounds: &BoundingBox, api_key: &str) -> String {
        format!(
            "{}/API/globaldem?demtype=NASADEM&south={}&north={}&west={}&east={}&outputFormat=GTiff&API_Key={}",
            self.endpoints.opentopography_base,
            bounds.south,
            bounds.north,
            bounds.west,
            bounds.east,
            urlencoding::encode(api_key)
        )
    }

    pub fn nighttime_lights_url(&self, country: &Country) -> String {
        format!(
            "{}/GIS/Covariates/Global_2015_2030/{}/VIIRS/v1/fvf/{}_viirs_fvf_2023_100m_v1.tif",
            self.endpoints.worldpop_base,
            country.iso3,
            country.iso3_lower()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::resolve_country;

    fn catalog() -> SourceCatalog {
        SourceCatalog::new(Endpoints::default())
    }

    #[test]
    fn test_specs_url() {
        let kenya = resolve_country("KEN").unwrap();
        assert_eq!(
            catalog().specs_url(&kenya),
            "https://geospatialsdk.s3.amazonaws.com/OnSSET_specs/KEN_data.yaml"
        );
    }

    #[test]
    fn test_population_url() {
        let kenya = resolve_country("KEN").unwrap();
        let url = catalog()
            .population_url(&kenya, PopulationResolution::OneKm)
            .unwrap();
        assert_eq!(
            url,
            "https://data.worldpop.org/GIS/Population/Global_2015_2030/R2025A/2023/KEN/v1/1km_ua/constrained/ken_pop_2023_CN_1km_R2025A_UA_v1.tif"
        );

        let err = catalog()
            .population_url(&kenya, PopulationResolution::HundredMetres)
            .unwrap_err();
        assert!(matches!(err, StarterKitError::UnsupportedParameter { .. }));
    }

    #[test]
    fn test_wind_and_ntl_urls() {
        let uganda = resolve_country("UGA").unwrap();
        assert_eq!(
            catalog().wind_speed_url(&uganda, WindHeight::new(50).unwrap()),
            "https://globalwindatlas.info/api/gis/country/UGA/wind-speed/50"
        );
        assert_eq!(
            catalog().nighttime_lights_url(&uganda),
            "https://data.worldpop.org/GIS/Covariates/Global_2015_2030/UGA/VIIRS/v1/fvf/uga_viirs_fvf_2023_100m_v1.tif"
        );
    }

    #[test]
    fn test_solar_url_encodes_name() {
        let country = Country {
            iso3: "CAF".to_string(),
            name: "Central African Republic".to_string(),
            bounds: None,
        };
        let url = catalog().solar_irradiation_url(&country);
        assert!(url.starts_with(
            "https://api.globalsolaratlas.info/download/Central%20African%20Republic/Central%20African%20Republic_GISdata"
        ));
        assert!(url.ends_with("GlobalSolarAtlas-v2_GEOTIFF.zip"));
    }

    #[test]
    fn test_elevation_url() {
        let bounds = BoundingBox::new(33.9, -4.7, 41.9, 5.0);
        let url = catalog().elevation_url(&bounds, "demoapikeyot2022");
        assert_eq!(
            url,
            "https://portal.opentopography.org/API/globaldem?demtype=NASADEM&south=-4.7&north=5&west=33.9&east=41.9&outputFormat=GTiff&API_Key=demoapikeyot2022"
        );
    }
}
