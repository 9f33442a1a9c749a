//! Data types for dataset requests and their outcomes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StarterKitError;

/// Resolution of the WorldPop population raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationResolution {
    /// 1 km constrained, UN-adjusted grid.
    #[serde(rename = "1km")]
    OneKm,

    /// 100 m grid. Recognised but not served yet.
    #[serde(rename = "100m")]
    HundredMetres,
}

impl PopulationResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopulationResolution::OneKm => "1km",
            PopulationResolution::HundredMetres => "100m",
        }
    }
}

impl FromStr for PopulationResolution {
    type Err = StarterKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1km" => Ok(PopulationResolution::OneKm),
            "100m" => Ok(PopulationResolution::HundredMetres),
            other => Err(StarterKitError::UnsupportedParameter {
                parameter: "population resolution",
                value: other.to_string(),
            }),
        }
    }
}

/// Measurement height for Global Wind Atlas mean wind speed, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct WindHeight(u16);

impl WindHeight {
    /// Heights published by the Global Wind Atlas country downloads.
    pub const PUBLISHED: [u16; 5] = [10, 50, 100, 150, 200];

    pub fn new(metres: u16) -> Result<Self, StarterKitError> {
        if Self::PUBLISHED.contains(&metres) {
            Ok(WindHeight(metres))
        } else {
            Err(StarterKitError::UnsupportedParameter {
                parameter: "wind height",
                value: metres.to_string(),
            })
        }
    }

    pub fn metres(&self) -> u16 {
        self.0
    }
}

impl Default for WindHeight {
    fn default() -> Self {
        WindHeight(100)
    }
}

impl TryFrom<u16> for WindHeight {
    type Error = StarterKitError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        WindHeight::new(value)
    }
}

impl From<WindHeight> for u16 {
    fn from(value: WindHeight) -> Self {
        value.0
    }
}

impl FromStr for WindHeight {
    type Err = StarterKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix('m').unwrap_or(trimmed);
        let metres = digits
            .parse::<u16>()
            .map_err(|_| StarterKitError::UnsupportedParameter {
                parameter: "wind height",
                value: trimmed.to_string(),
            })?;
        WindHeight::new(metres)
    }
}

impl fmt::Display for WindHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Road classes kept when no explicit selection is given.
pub const DEFAULT_ROAD_CLASSES: [&str; 5] =
    ["motorway", "trunk", "primary", "secondary", "tertiary"];

/// A dataset that can be fetched for a country, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetKind {
    /// OnSSET model specs (YAML).
    Specs,

    /// Level-0 administrative boundary.
    Boundaries,

    /// WorldPop population counts.
    Population { resolution: PopulationResolution },

    /// Medium-voltage grid lines.
    PowerLines,

    /// Global Wind Atlas mean wind speed.
    WindSpeed { height: WindHeight },

    /// Global Solar Atlas long-term yearly/monthly totals.
    SolarIrradiation,

    /// NASADEM elevation over the country bounding box.
    Elevation,

    /// VIIRS nighttime lights covariate.
    NighttimeLights,

    /// Drivable road edges restricted to the given highway classes.
    Roads { classes: Vec<String> },
}

impl DatasetKind {
    /// Every dataset with its default parameters.
    pub fn all() -> Vec<DatasetKind> {
        vec![
            DatasetKind::Specs,
            DatasetKind::Boundaries,
            DatasetKind::Population {
                resolution: PopulationResolution::OneKm,
            },
            DatasetKind::PowerLines,
            DatasetKind::WindSpeed {
                height: WindHeight::default(),
            },
            DatasetKind::SolarIrradiation,
            DatasetKind::Elevation,
            DatasetKind::NighttimeLights,
            DatasetKind::Roads {
                classes: DEFAULT_ROAD_CLASSES.iter().map(|c| c.to_string()).collect(),
            },
        ]
    }

    /// Short machine-friendly name, used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            DatasetKind::Specs => "specs",
            DatasetKind::Boundaries => "boundaries",
            DatasetKind::Population { .. } => "population",
            DatasetKind::PowerLines => "power_lines",
            DatasetKind::WindSpeed { .. } => "wind_speed",
            DatasetKind::SolarIrradiation => "solar_irradiation",
            DatasetKind::Elevation => "elevation",
            DatasetKind::NighttimeLights => "nighttime_lights",
            DatasetKind::Roads { .. } => "roads",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parses `label[:parameter]`, e.g. `wind_speed:50`, `population:1km`,
/// `roads:primary|secondary`.
impl FromStr for DatasetKind {
    type Err = StarterKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, param) = match s.trim().split_once(':') {
            Some((label, param)) => (label, Some(param.trim())),
            None => (s.trim(), None),
        };

        let kind = match label.to_ascii_lowercase().as_str() {
            "specs" => DatasetKind::Specs,
            "boundaries" => DatasetKind::Boundaries,
            "population" => DatasetKind::Population {
                resolution: param
                    .map(str::parse::<PopulationResolution>)
                    .transpose()?
                    .unwrap_or(PopulationResolution::OneKm),
            },
            "power_lines" => DatasetKind::PowerLines,
            "wind_speed" | "wind" => DatasetKind::WindSpeed {
                height: param
                    .map(str::parse::<WindHeight>)
                    .transpose()?
                    .unwrap_or_default(),
            },
            "solar_irradiation" | "solar" => DatasetKind::SolarIrradiation,
            "elevation" | "dem" => DatasetKind::Elevation,
            "nighttime_lights" | "ntl" => DatasetKind::NighttimeLights,
            "roads" => DatasetKind::Roads {
                classes: match param {
                    Some(list) => list
                        .split('|')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect(),
                    None => DEFAULT_ROAD_CLASSES.iter().map(|c| c.to_string()).collect(),
                },
            },
            other => {
                return Err(StarterKitError::UnsupportedParameter {
                    parameter: "dataset",
                    value: other.to_string(),
                });
            }
        };

        Ok(kind)
    }
}

/// A single dataset request for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRequest {
    /// ISO 3166-1 alpha-3 country code.
    pub country: String,

    pub dataset: DatasetKind,
}

impl DatasetRequest {
    pub fn new(country: &str, dataset: DatasetKind) -> Self {
        Self {
            country: country.to_string(),
            dataset,
        }
    }
}

/// What a successful fetch left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The dataset was written to `path`.
    Saved { path: PathBuf },

    /// The request succeeded but produced nothing worth writing.
    NothingToSave { reason: String },
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            FetchOutcome::Saved { path } => Some(path),
            FetchOutcome::NothingToSave { .. } => None,
        }
    }
}

/// A dataset whose fetch failed inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetError {
    pub dataset: String,
    pub message: String,
}

/// Summary of a sequential batch run for one country.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// ISO3 code of the country.
    pub country: String,

    /// Human-readable country name.
    pub country_name: String,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Files written, keyed by dataset label.
    pub saved: Vec<(String, PathBuf)>,

    /// Requests that completed without producing a file.
    pub skipped: Vec<(String, String)>,

    /// Requests that failed; siblings still ran.
    pub errors: Vec<DatasetError>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_resolution_parse() {
        assert_eq!(
            "1km".parse::<PopulationResolution>().unwrap(),
            PopulationResolution::OneKm
        );
        assert_eq!(
            "100M".parse::<PopulationResolution>().unwrap(),
            PopulationResolution::HundredMetres
        );
        assert!("5km".parse::<PopulationResolution>().is_err());
    }

    #[test]
    fn test_wind_height_validation() {
        assert_eq!(WindHeight::new(50).unwrap().metres(), 50);
        assert_eq!("150m".parse::<WindHeight>().unwrap().metres(), 150);
        assert!(WindHeight::new(75).is_err());
        assert!("high".parse::<WindHeight>().is_err());
    }

    #[test]
    fn test_dataset_kind_parse() {
        assert_eq!("specs".parse::<DatasetKind>().unwrap(), DatasetKind::Specs);
        assert_eq!(
            "wind_speed:50".parse::<DatasetKind>().unwrap(),
            DatasetKind::WindSpeed {
                height: WindHeight::new(50).unwrap()
            }
        );
        assert_eq!(
            "roads:primary|secondary".parse::<DatasetKind>().unwrap(),
            DatasetKind::Roads {
                classes: vec!["primary".to_string(), "secondary".to_string()]
            }
        );
        assert!("weather".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_dataset_kind_serde() {
        let kind = DatasetKind::Population {
            resolution: PopulationResolution::OneKm,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "population");
        assert_eq!(json["resolution"], "1km");

        let wind: DatasetKind =
            serde_json::from_str(r#"{"kind":"wind_speed","height":200}"#).unwrap();
        assert_eq!(wind.label(), "wind_speed");
        assert!(serde_json::from_str::<DatasetKind>(r#"{"kind":"wind_speed","height":7}"#).is_err());
    }

    #[test]
    fn test_all_covers_every_label() {
        let labels: Vec<_> = DatasetKind::all().iter().map(|k| k.label()).collect();
        assert_eq!(labels.len(), 9);
        assert!(labels.contains(&"roads"));
        assert!(labels.contains(&"nighttime_lights"));
    }
}
