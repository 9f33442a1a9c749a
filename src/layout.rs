//! Deterministic on-disk layout: `<root>/<ISO3>/<Folder>/<ISO3>_<suffix>.<ext>`.

use std::path::{Path, PathBuf};

use crate::model::DatasetKind;

/// Continent-wide power-lines file, shared by every country.
pub const POWER_LINES_FILE: &str = "Africa_mv_lines.gpkg";

/// Maps datasets to paths under a data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder name for a dataset kind.
    pub fn folder(kind: &DatasetKind) -> &'static str {
        match kind {
            DatasetKind::Specs => "Specs",
            DatasetKind::Boundaries => "Boundaries",
            DatasetKind::Population { .. } => "Population",
            DatasetKind::PowerLines => "PowerLines",
            DatasetKind::WindSpeed { .. } => "WindSpeed",
            DatasetKind::SolarIrradiation => "SolarIrradiation",
            DatasetKind::Elevation => "Elevation",
            DatasetKind::NighttimeLights => "NighttimeLights",
            DatasetKind::Roads { .. } => "Roads",
        }
    }

    /// Directory holding a country's files for `kind`.
    pub fn dataset_dir(&self, iso3: &str, kind: &DatasetKind) -> PathBuf {
        match kind {
            DatasetKind::PowerLines => self.root.clone(),
            _ => self.root.join(iso3).join(Self::folder(kind)),
        }
    }

    /// Final path of the file a fetch produces.
    ///
    /// Power lines ignore `iso3` and always land on [`POWER_LINES_FILE`].
    pub fn dataset_path(&self, iso3: &str, kind: &DatasetKind) -> PathBuf {
        let file_name = match kind {
            DatasetKind::Specs => format!("{iso3}_data.yaml"),
            DatasetKind::Boundaries => format!("{iso3}_adm_0.gpkg"),
            DatasetKind::Population { .. } => format!("{iso3}_pop.tif"),
            DatasetKind::PowerLines => POWER_LINES_FILE.to_string(),
            DatasetKind::WindSpeed { height } => format!("{iso3}_wind_speed_{height}.tif"),
            DatasetKind::SolarIrradiation => format!("{iso3}_solar_irradiance.zip"),
            DatasetKind::Elevation => format!("{iso3}_dem.tif"),
            DatasetKind::NighttimeLights => format!("{iso3}_ntl.tif"),
            DatasetKind::Roads { .. } => format!("{iso3}_roads.gpkg"),
        };
        self.dataset_dir(iso3, kind).join(file_name)
    }

    /// Where the level-0 boundary of `iso3` is stored.
    pub fn boundary_path(&self, iso3: &str) -> PathBuf {
        self.dataset_path(iso3, &DatasetKind::Boundaries)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("Data")
    }
}
