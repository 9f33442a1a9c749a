//! Per-dataset fetch operations and the sequential batch driver.
//!
//! # Usage
//!
//! ```ignore
//! let fetcher = Fetcher::new(Config::from_env());
//! let report = fetcher.fetch_all("KEN", &DatasetKind::all()).await?;
//! ```

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::country::{BoundingBox, Country, resolve_country};
use crate::data_sources::{Downloader, GadmClient, OverpassClient, SourceCatalog};
use crate::error::{Result, StarterKitError};
use crate::gpkg;
use crate::layout::DataLayout;
use crate::model::{
    BatchReport, DatasetError, DatasetKind, DatasetRequest, FetchOutcome, PopulationResolution,
    WindHeight,
};
use crate::postprocess::{GeometrySource, mask_raster_with_geometry, unzip_file};
use crate::roads;

/// Fetches starter-kit datasets into a [`DataLayout`].
#[derive(Clone)]
pub struct Fetcher {
    config: Config,
    layout: DataLayout,
    catalog: SourceCatalog,
    http: Downloader,
    gadm: GadmClient,
    overpass: OverpassClient,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Fetcher {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::new();
        let http = Downloader::with_client(client.clone());

        Self {
            layout: DataLayout::new(config.data_dir.clone()),
            catalog: SourceCatalog::new(config.endpoints.clone()),
            gadm: GadmClient::with_base_url(&config.endpoints.gadm_base)
                .with_downloader(http.clone()),
            overpass: OverpassClient::with_url(&config.endpoints.overpass_url)
                .with_client(client),
            http,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// OnSSET specs YAML for the country.
    pub async fn get_specs(&self, country: &Country) -> Result<FetchOutcome> {
        let url = self.catalog.specs_url(country);
        let path = self.layout.dataset_path(&country.iso3, &DatasetKind::Specs);
        self.download(country, "specs", &url, &path).await
    }

    /// Level-0 boundary from GADM, written as a GeoPackage.
    pub async fn get_boundaries(&self, country: &Country) -> Result<FetchOutcome> {
        let started = Instant::now();
        let path = self.layout.boundary_path(&country.iso3);
        ensure_parent(&path).await?;

        let features = self.gadm.get_boundary(country).await?;
        gpkg::write_features(&path, &features).await?;

        info!(
            country = %country.iso3,
            dataset = "boundaries",
            path = %path.display(),
            features = features.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Boundaries saved"
        );
        Ok(FetchOutcome::Saved { path })
    }

    /// WorldPop population counts.
    ///
    /// # Errors
    ///
    /// [`StarterKitError::UnsupportedParameter`] for the 100 m grid, which is
    /// not published in the current release.
    pub async fn get_population(
        &self,
        country: &Country,
        resolution: PopulationResolution,
    ) -> Result<FetchOutcome> {
        let url = self.catalog.population_url(country, resolution)?;
        let path = self
            .layout
            .dataset_path(&country.iso3, &DatasetKind::Population { resolution });
        self.download(country, "population", &url, &path).await
    }

    /// Medium-voltage grid for Africa.
    ///
    /// The file covers the whole continent and is stored once at the data
    /// root, so every country overwrites the same path.
    pub async fn get_power_lines(&self, country: &Country) -> Result<FetchOutcome> {
        let path = self
            .layout
            .dataset_path(&country.iso3, &DatasetKind::PowerLines);
        warn!(
            country = %country.iso3,
            path = %path.display(),
            "Power lines are continent-wide; the shared file is replaced"
        );
        let url = self.catalog.power_lines_url().to_string();
        self.download(country, "power_lines", &url, &path).await
    }

    /// Global Wind Atlas mean wind speed at `height`.
    pub async fn get_wind_speed(&self, country: &Country, height: WindHeight) -> Result<FetchOutcome> {
        let url = self.catalog.wind_speed_url(country, height);
        let path = self
            .layout
            .dataset_path(&country.iso3, &DatasetKind::WindSpeed { height });
        self.download(country, "wind_speed", &url, &path).await
    }

    /// Global Solar Atlas GIS bundle, extracted next to the archive.
    pub async fn get_solar_irradiation(&self, country: &Country) -> Result<FetchOutcome> {
        let url = self.catalog.solar_irradiation_url(country);
        let path = self
            .layout
            .dataset_path(&country.iso3, &DatasetKind::SolarIrradiation);
        let outcome = self
            .download(country, "solar_irradiation", &url, &path)
            .await?;

        let dir = self
            .layout
            .dataset_dir(&country.iso3, &DatasetKind::SolarIrradiation);
        let entries = unzip_file(&path, &dir)?;
        debug!(country = %country.iso3, entries, dir = %dir.display(), "Solar bundle extracted");

        Ok(outcome)
    }

    /// NASADEM elevation over the country's bounding box.
    ///
    /// Uses `country.bounds` when set; otherwise resolves them first.
    pub async fn get_elevation(&self, country: &Country) -> Result<FetchOutcome> {
        let bounds = match country.bounds {
            Some(bounds) => bounds,
            None => self.resolve_country_bounds(country).await?,
        };

        let url = self
            .catalog
            .elevation_url(&bounds, &self.config.opentopography_key);
        let path = self.layout.dataset_path(&country.iso3, &DatasetKind::Elevation);
        self.download(country, "elevation", &url, &path).await
    }

    /// VIIRS nighttime lights covariate from WorldPop.
    pub async fn get_nighttime_lights(&self, country: &Country) -> Result<FetchOutcome> {
        let url = self.catalog.nighttime_lights_url(country);
        let path = self
            .layout
            .dataset_path(&country.iso3, &DatasetKind::NighttimeLights);
        self.download(country, "nighttime_lights", &url, &path).await
    }

    /// Drivable road network restricted to `classes`.
    ///
    /// Returns [`FetchOutcome::NothingToSave`] and writes no file when no
    /// edge has an accepted class.
    pub async fn get_roads(&self, country: &Country, classes: &[String]) -> Result<FetchOutcome> {
        let started = Instant::now();
        let kind = DatasetKind::Roads {
            classes: classes.to_vec(),
        };
        let path = self.layout.dataset_path(&country.iso3, &kind);
        ensure_parent(&path).await?;

        let network = self.overpass.get_drive_network(country).await?;
        let outcome = roads::save_filtered(network, classes, &path).await?;

        info!(
            country = %country.iso3,
            dataset = "roads",
            saved = outcome.path().is_some(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Roads processed"
        );
        Ok(outcome)
    }

    /// Bounding box of the country's level-0 boundary.
    ///
    /// Reads the boundary file when one has been saved, otherwise asks GADM.
    pub async fn resolve_country_bounds(&self, country: &Country) -> Result<BoundingBox> {
        let boundary = self.layout.boundary_path(&country.iso3);

        let geometries = if boundary.exists() {
            debug!(path = %boundary.display(), "Bounds from saved boundary");
            gpkg::read_geometries(&boundary).await?
        } else {
            self.gadm
                .get_boundary(country)
                .await?
                .into_iter()
                .map(|f| f.geometry)
                .collect()
        };

        BoundingBox::of_geometries(&geometries).ok_or_else(|| {
            StarterKitError::Geometry(format!("boundary of {} has no extent", country.iso3))
        })
    }

    /// Fetch one dataset, applying the boundary mask when configured.
    pub async fn fetch(&self, country: &Country, kind: &DatasetKind) -> Result<FetchOutcome> {
        let outcome = match kind {
            DatasetKind::Specs => self.get_specs(country).await?,
            DatasetKind::Boundaries => self.get_boundaries(country).await?,
            DatasetKind::Population { resolution } => {
                self.get_population(country, *resolution).await?
            }
            DatasetKind::PowerLines => self.get_power_lines(country).await?,
            DatasetKind::WindSpeed { height } => self.get_wind_speed(country, *height).await?,
            DatasetKind::SolarIrradiation => self.get_solar_irradiation(country).await?,
            DatasetKind::Elevation => self.get_elevation(country).await?,
            DatasetKind::NighttimeLights => self.get_nighttime_lights(country).await?,
            DatasetKind::Roads { classes } => self.get_roads(country, classes).await?,
        };

        let maskable = matches!(kind, DatasetKind::WindSpeed { .. } | DatasetKind::Elevation);
        if self.config.mask_to_boundary && maskable {
            if let Some(path) = outcome.path() {
                self.mask_to_boundary(country, path).await?;
            }
        }

        Ok(outcome)
    }

    /// Resolve the request's country and fetch its dataset.
    pub async fn fetch_request(&self, request: &DatasetRequest) -> Result<FetchOutcome> {
        let country = resolve_country(&request.country)?;
        self.fetch(&country, &request.dataset).await
    }

    /// Fetch several datasets for one country, in order.
    ///
    /// A failing dataset is logged and recorded in the report; the rest
    /// still run. Only an unknown country fails the whole batch.
    pub async fn fetch_all(&self, iso3: &str, kinds: &[DatasetKind]) -> Result<BatchReport> {
        let started_at = Utc::now();
        let mut country = resolve_country(iso3)?;

        info!(country = %country.iso3, name = %country.name, datasets = kinds.len(), "Starting batch");

        let mut saved = Vec::new();
        let mut skipped = Vec::new();
        let mut errors = Vec::new();

        for kind in kinds {
            // Bounds come from a boundary saved earlier in the batch when there is one.
            if *kind == DatasetKind::Elevation && country.bounds.is_none() {
                match self.resolve_country_bounds(&country).await {
                    Ok(bounds) => country = country.with_bounds(bounds),
                    Err(e) => {
                        warn!(country = %country.iso3, dataset = %kind, error = %e, "Could not resolve country bounds");
                        errors.push(DatasetError {
                            dataset: kind.to_string(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                }
            }

            match self.fetch(&country, kind).await {
                Ok(FetchOutcome::Saved { path }) => saved.push((kind.to_string(), path)),
                Ok(FetchOutcome::NothingToSave { reason }) => {
                    skipped.push((kind.to_string(), reason))
                }
                Err(e) => {
                    warn!(country = %country.iso3, dataset = %kind, error = %e, "Dataset fetch failed");
                    errors.push(DatasetError {
                        dataset: kind.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let report = BatchReport {
            country: country.iso3.clone(),
            country_name: country.name.clone(),
            started_at,
            finished_at: Utc::now(),
            saved,
            skipped,
            errors,
        };

        info!(
            country = %report.country,
            saved = report.saved.len(),
            skipped = report.skipped.len(),
            failed = report.errors.len(),
            "Batch finished"
        );
        Ok(report)
    }

    async fn download(
        &self,
        country: &Country,
        dataset: &str,
        url: &str,
        path: &Path,
    ) -> Result<FetchOutcome> {
        let started = Instant::now();
        info!(country = %country.iso3, dataset, url, "Downloading");

        ensure_parent(path).await?;
        let bytes = self.http.download_to(url, path).await?;

        info!(
            country = %country.iso3,
            dataset,
            path = %path.display(),
            bytes,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Saved"
        );
        Ok(FetchOutcome::Saved {
            path: path.to_path_buf(),
        })
    }

    async fn mask_to_boundary(&self, country: &Country, raster: &Path) -> Result<()> {
        let boundary = self.layout.boundary_path(&country.iso3);
        if !boundary.exists() {
            debug!(country = %country.iso3, "No saved boundary; raster left unmasked");
            return Ok(());
        }

        mask_raster_with_geometry(raster, GeometrySource::from(boundary.as_path()), raster).await
    }
}

/// Create the dataset directory of `path` before anything is requested.
async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;

    fn fetcher_at(dir: &Path) -> Fetcher {
        Fetcher::new(
            Config::default()
                .with_data_dir(dir)
                .with_endpoints(Endpoints::all_at("http://127.0.0.1:9")),
        )
    }

    #[tokio::test]
    async fn test_unknown_country_fails_batch() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher_at(dir.path())
            .fetch_all("XXX", &[DatasetKind::Specs])
            .await
            .unwrap_err();

        assert!(matches!(err, StarterKitError::UnknownCountry(_)));
    }

    #[tokio::test]
    async fn test_population_100m_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let kenya = resolve_country("KEN").unwrap();
        let err = fetcher_at(dir.path())
            .get_population(&kenya, PopulationResolution::HundredMetres)
            .await
            .unwrap_err();

        assert!(matches!(err, StarterKitError::UnsupportedParameter { .. }));
        assert!(!dir.path().join("KEN").exists());
    }

    #[tokio::test]
    async fn test_bounds_from_saved_boundary() {
        use geo_types::{Geometry, polygon};

        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_at(dir.path());
        let kenya = resolve_country("KEN").unwrap();

        let outline: Geometry<f64> = polygon![
            (x: 34.0, y: -4.7), (x: 41.9, y: -4.7), (x: 41.9, y: 5.0), (x: 34.0, y: 5.0), (x: 34.0, y: -4.7)
        ]
        .into();
        gpkg::write_features(
            &fetcher.layout().boundary_path("KEN"),
            &[gpkg::Feature::new(outline)],
        )
        .await
        .unwrap();

        let bounds = fetcher.resolve_country_bounds(&kenya).await.unwrap();
        assert_eq!(bounds, BoundingBox::new(34.0, -4.7, 41.9, 5.0));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let report = fetcher_at(dir.path())
            .fetch_all("KEN", &[DatasetKind::Specs, DatasetKind::NighttimeLights])
            .await
            .unwrap();

        assert_eq!(report.country, "KEN");
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].dataset, "specs");
        assert!(report.saved.is_empty());
        assert!(!report.is_clean());
    }
}
