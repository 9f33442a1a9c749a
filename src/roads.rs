//! Road network edges and class filtering.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use geo::HaversineLength;
use geo_types::{Geometry, LineString};
use tracing::{debug, info};

use crate::error::Result;
use crate::gpkg::{self, Feature};
use crate::model::FetchOutcome;

/// OSM tags copied onto each saved edge, when present.
const KEPT_TAGS: [&str; 9] = [
    "name", "ref", "oneway", "maxspeed", "lanes", "surface", "bridge", "tunnel", "junction",
];

/// One road segment: an OSM way with its class and geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadEdge {
    pub osm_id: i64,

    /// OSM `highway` value, e.g. `primary`.
    pub highway: String,

    pub tags: BTreeMap<String, String>,
    pub geometry: LineString<f64>,
}

impl RoadEdge {
    /// Great-circle length in metres.
    pub fn length_m(&self) -> f64 {
        self.geometry.haversine_length()
    }

    fn to_feature(&self) -> Feature {
        let mut feature = Feature::new(Geometry::LineString(self.geometry.clone()))
            .with_property("osmid", self.osm_id.to_string())
            .with_property("highway", self.highway.as_str())
            .with_property("length", format!("{:.3}", self.length_m()));

        for key in KEPT_TAGS {
            if let Some(value) = self.tags.get(key) {
                feature = feature.with_property(key, value.as_str());
            }
        }
        feature
    }
}

/// Edges of a road network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadNetwork {
    pub edges: Vec<RoadEdge>,
}

impl RoadNetwork {
    pub fn new(edges: Vec<RoadEdge>) -> Self {
        Self { edges }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Keep only edges whose `highway` class is in `classes`.
    pub fn filter_classes<S: AsRef<str>>(self, classes: &[S]) -> RoadNetwork {
        let accepted: HashSet<&str> = classes.iter().map(|c| c.as_ref()).collect();
        let edges = self
            .edges
            .into_iter()
            .filter(|e| accepted.contains(e.highway.as_str()))
            .collect();
        RoadNetwork { edges }
    }

    pub fn to_features(&self) -> Vec<Feature> {
        self.edges.iter().map(RoadEdge::to_feature).collect()
    }
}

/// Filter `network` by class and write the survivors to `path`.
///
/// Nothing is written when no edge survives the filter.
pub async fn save_filtered<S: AsRef<str>>(
    network: RoadNetwork,
    classes: &[S],
    path: &Path,
) -> Result<FetchOutcome> {
    let total = network.len();
    let filtered = network.filter_classes(classes);
    debug!(total, kept = filtered.len(), "Filtered road network");

    if filtered.is_empty() {
        let reason = format!("no roads of the requested classes among {total} edges");
        info!(path = %path.display(), "{}", reason);
        return Ok(FetchOutcome::NothingToSave { reason });
    }

    gpkg::write_features(path, &filtered.to_features()).await?;
    Ok(FetchOutcome::Saved {
        path: path.to_path_buf(),
    })
}
